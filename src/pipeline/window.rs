//! Trailing moving average over ordered partitions.

use chrono::NaiveDate;
use std::collections::HashMap;

/// Parse a loan period such as `2024-03` into the first day of that month.
///
/// Also accepts `202403` and a full `2024-03-15`. Anything else is `None`,
/// which orders before every real date.
pub fn parse_period(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}01", value), "%Y%m%d"))
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

/// Parse a numeric amount; blanks and non-numbers are treated as null
pub fn parse_amount(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Mean of `values` over the current row and up to `preceding` earlier rows
/// of the same partition, ordered by `order` ascending.
///
/// Rows keep their input positions in the result. Ties in `order` keep
/// their input order. Null values are skipped; a window of only nulls
/// averages to `None`.
pub fn trailing_average(
    partitions: &[&str],
    order: &[Option<NaiveDate>],
    values: &[Option<f64>],
    preceding: usize,
) -> Vec<Option<f64>> {
    debug_assert_eq!(partitions.len(), order.len());
    debug_assert_eq!(partitions.len(), values.len());

    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, key) in partitions.iter().enumerate() {
        groups.entry(*key).or_default().push(idx);
    }

    let mut result = vec![None; partitions.len()];
    for mut members in groups.into_values() {
        members.sort_by_key(|&idx| order[idx]);

        for (pos, &row) in members.iter().enumerate() {
            let frame = &members[pos.saturating_sub(preceding)..=pos];
            let (sum, count) = frame
                .iter()
                .filter_map(|&i| values[i])
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            result[row] = (count > 0).then(|| sum / count as f64);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(y: i32, m: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, 1)
    }

    #[test]
    fn test_parse_period_formats() {
        assert_eq!(parse_period("2024-03"), month(2024, 3));
        assert_eq!(parse_period("202403"), month(2024, 3));
        assert_eq!(
            parse_period("2024-03-15"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(parse_period(""), None);
        assert_eq!(parse_period("March 2024"), None);
        assert_eq!(parse_period("2024-13"), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 1500.25 "), Some(1500.25));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount("NaN"), None);
    }

    #[test]
    fn test_partial_then_full_windows() {
        let partitions = ["10"; 4];
        let order = [month(2024, 1), month(2024, 2), month(2024, 3), month(2024, 4)];
        let values = [Some(100.0), Some(200.0), Some(600.0), Some(1000.0)];

        let avg = trailing_average(&partitions, &order, &values, 2);

        assert_eq!(avg[0], Some(100.0)); // own amount
        assert_eq!(avg[1], Some(150.0)); // mean of first two
        assert_eq!(avg[2], Some(300.0)); // trailing three
        assert_eq!(avg[3], Some(600.0)); // 200, 600, 1000
    }

    #[test]
    fn test_partitions_are_independent_and_positions_preserved() {
        // Interleaved branches, out of order within each branch
        let partitions = ["A", "B", "A", "B", "A"];
        let order = [
            month(2024, 3),
            month(2024, 1),
            month(2024, 1),
            month(2024, 2),
            month(2024, 2),
        ];
        let values = [Some(30.0), Some(5.0), Some(10.0), Some(15.0), Some(20.0)];

        let avg = trailing_average(&partitions, &order, &values, 2);

        // Branch A ordered: 10 (Jan), 20 (Feb), 30 (Mar)
        assert_eq!(avg[2], Some(10.0));
        assert_eq!(avg[4], Some(15.0));
        assert_eq!(avg[0], Some(20.0));
        // Branch B ordered: 5 (Jan), 15 (Feb)
        assert_eq!(avg[1], Some(5.0));
        assert_eq!(avg[3], Some(10.0));
    }

    #[test]
    fn test_nulls_skipped_and_unparsed_periods_first() {
        let partitions = ["A", "A", "A"];
        let order = [month(2024, 2), None, month(2024, 3)];
        let values = [None, Some(40.0), Some(80.0)];

        let avg = trailing_average(&partitions, &order, &values, 2);

        // Ordered: None period (40), Feb (null), Mar (80)
        assert_eq!(avg[1], Some(40.0));
        assert_eq!(avg[0], Some(40.0));
        assert_eq!(avg[2], Some(60.0));

        let all_null = trailing_average(&["A"], &[month(2024, 1)], &[None], 2);
        assert_eq!(all_null, vec![None]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let partitions = ["A", "A", "A", "A"];
        let order = [month(2024, 1); 4];
        let values = [Some(1.0), Some(2.0), Some(3.0), Some(4.0)];

        let avg = trailing_average(&partitions, &order, &values, 2);
        assert_eq!(avg, vec![Some(1.0), Some(1.5), Some(2.0), Some(3.0)]);
    }
}
