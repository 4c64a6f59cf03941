/// Progress events recorded by the job driver as stages complete
#[derive(Debug, Clone)]
pub enum StageEvent {
    /// One table landed for the month
    TableExtracted {
        rows: u64,
        bytes: u64,
        duration_ms: u64,
    },
    /// One table could not be extracted
    TableFailed,
    /// Transform finished and wrote its per-bank outputs
    TransformCompleted {
        joined_rows: u64,
        files_written: usize,
        duration_ms: u64,
    },
}

/// Statistics aggregated from stage events
#[derive(Debug, Default, Clone)]
pub struct RunStats {
    pub tables_extracted: usize,
    pub tables_failed: usize,
    pub rows_extracted: u64,
    pub bytes_written: u64,
    pub joined_rows: u64,
    pub files_written: usize,
    pub extract_durations_ms: Vec<u64>,
    pub transform_duration_ms: Option<u64>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a stage event
    pub fn update(&mut self, event: &StageEvent) {
        match event {
            StageEvent::TableExtracted {
                rows,
                bytes,
                duration_ms,
            } => {
                self.tables_extracted += 1;
                self.rows_extracted += rows;
                self.bytes_written += bytes;
                self.extract_durations_ms.push(*duration_ms);
            }
            StageEvent::TableFailed => {
                self.tables_failed += 1;
            }
            StageEvent::TransformCompleted {
                joined_rows,
                files_written,
                duration_ms,
            } => {
                self.joined_rows += joined_rows;
                self.files_written += files_written;
                self.transform_duration_ms = Some(*duration_ms);
            }
        }
    }

    /// Calculate percentile from per-table extraction durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.extract_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.extract_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Slowest table extraction
    pub fn slowest_extract_ms(&self) -> Option<u64> {
        self.extract_durations_ms.iter().copied().max()
    }
}
