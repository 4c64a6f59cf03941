//! Integration tests for the job driver
//!
//! These tests use SQLite in-memory databases and a local object store to
//! run the whole job end to end: secrets, extraction, transform and shutdown.

#[cfg(test)]
mod tests {
    use crate::{
        config::{JobConfig, JobConfigBuilder},
        db::Pool,
        error::{ExitCode, JobError},
        io::{LocalObjectStore, ObjectStore},
        pipeline::frame::Frame,
        runner::run_job,
        secrets::{DbCredentials, SecretResolver},
        session::{JobSession, SessionOpener, layout_for},
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const SECRET: &str = r#"{"endpoint":"db.internal","username":"etl","password":"pw"}"#;

    // ============ Test Helpers ============

    /// Resolver that counts lookups
    struct RecordingResolver {
        payload: Option<String>,
        calls: AtomicUsize,
    }

    impl RecordingResolver {
        fn new(payload: Option<&str>) -> Self {
            Self {
                payload: payload.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SecretResolver for RecordingResolver {
        async fn secret_string(&self, _secret_id: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    /// Opener handing out sessions over a shared SQLite pool and a local directory
    struct TestOpener {
        pool: Pool,
        root: PathBuf,
        opened: AtomicUsize,
    }

    impl TestOpener {
        fn new(pool: Pool, root: &TempDir) -> Self {
            Self {
                pool,
                root: root.path().to_path_buf(),
                opened: AtomicUsize::new(0),
            }
        }

        fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionOpener for TestOpener {
        async fn open(
            &self,
            config: &JobConfig,
            _credentials: &DbCredentials,
        ) -> Result<JobSession, JobError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(JobSession::from_parts(
                self.pool.clone(),
                Arc::new(LocalObjectStore::new(&self.root)),
                layout_for(config),
            ))
        }
    }

    /// Five banking tables with March 2024 data, plus rows outside the month
    /// and records that have no match further down the join chain
    async fn setup_banking_db() -> Pool {
        let pool = Pool::sqlite_in_memory().await.unwrap();
        let statements = [
            "CREATE TABLE Bank (idBank INTEGER, Name TEXT, date TEXT)",
            "INSERT INTO Bank VALUES (1, 'A', '2024-03-01'), (2, 'B', '2024-03-01'), \
             (3, 'Closed', '2024-02-01')",
            "CREATE TABLE Branch (idBranch INTEGER, Bank_idBank INTEGER, Name TEXT, date TEXT)",
            "INSERT INTO Branch VALUES (10, 1, 'A-Main', '2024-03-02'), \
             (11, 1, 'A-East', '2024-03-02'), (20, 2, 'B-Main', '2024-03-02')",
            "CREATE TABLE Client (idClient INTEGER, Branch_idBranch INTEGER, date TEXT)",
            "INSERT INTO Client VALUES (100, 10, '2024-03-03'), (110, 11, '2024-03-03'), \
             (200, 20, '2024-03-03'), (900, 99, '2024-03-03')",
            "CREATE TABLE Account (idAccount INTEGER, Client_idClient INTEGER, date TEXT)",
            "INSERT INTO Account VALUES (1000, 100, '2024-03-04'), (1100, 110, '2024-03-04'), \
             (2000, 200, '2024-03-04')",
            "CREATE TABLE Loan (idLoan INTEGER, Account_idAccount INTEGER, Amount INTEGER, \
             year_month TEXT, date TEXT)",
            "INSERT INTO Loan VALUES \
             (1, 1000, 100, '2024-01', '2024-03-05'), \
             (2, 1000, 200, '2024-02', '2024-03-06'), \
             (3, 1000, 600, '2024-03', '2024-03-31'), \
             (4, 1100, 50, '2024-03', '2024-03-08'), \
             (5, 2000, 80, '2024-02', '2024-03-09'), \
             (6, 2000, 40, '2024-03', '2024-03-10'), \
             (7, 7777, 5, '2024-03', '2024-03-11'), \
             (8, 2000, 9999, '2024-04', '2024-04-01')",
        ];
        for sql in statements {
            pool.execute_query(sql).await.unwrap();
        }
        pool
    }

    fn all_tables() -> Vec<String> {
        ["Bank", "Branch", "Client", "Account", "Loan"]
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    fn march_config(tables: Vec<String>) -> JobConfigBuilder {
        let mut builder = JobConfigBuilder::default();
        builder
            .tables(tables)
            .base_uri("/unused")
            .run_date(NaiveDate::from_ymd_opt(2024, 3, 20).unwrap());
        builder
    }

    async fn read_frame(root: &TempDir, key: &str) -> Frame {
        let store = LocalObjectStore::new(root.path());
        Frame::from_csv(&store.get(key).await.unwrap()).unwrap()
    }

    /// (idBranch, avgLoanAmount) pairs parsed back to numbers, sorted
    fn averages(frame: &Frame) -> Vec<(String, f64)> {
        let mut pairs: Vec<(String, f64)> = frame
            .rows
            .iter()
            .map(|r| (r[0].clone(), r[1].parse::<f64>().unwrap()))
            .collect();
        pairs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        pairs
    }

    // ============ Tests ============

    #[tokio::test]
    async fn test_full_run_writes_landing_and_bank_files() {
        let dir = TempDir::new().unwrap();
        let pool = setup_banking_db().await;
        let resolver = RecordingResolver::new(Some(SECRET));
        let opener = TestOpener::new(pool.clone(), &dir);
        let config = march_config(all_tables()).build().unwrap();

        let report = run_job(&config, &resolver, &opener).await.unwrap();

        assert_eq!(report.window.year_month().as_str(), "202403");
        assert_eq!(report.extracts.len(), 5);
        assert_eq!(report.stats.tables_extracted, 5);

        // Loan 8 is in April and falls outside the window
        let loan = read_frame(&dir, "bronze/Loan/202403/Loan_monthly_data_extract.csv").await;
        assert_eq!(loan.len(), 7);
        // Bank 3 only exists in February
        let bank = read_frame(&dir, "bronze/Bank/202403/Bank_monthly_data_extract.csv").await;
        assert_eq!(bank.len(), 2);

        let transform = report.transform.unwrap();
        // Loan 7 has no account and is dropped by the join
        assert_eq!(transform.joined_rows, 6);
        let keys: Vec<&str> = transform.files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["silver/A/202403/A_20240320.csv", "silver/B/202403/B_20240320.csv"]
        );

        let bank_a = read_frame(&dir, "silver/A/202403/A_20240320.csv").await;
        assert_eq!(bank_a.columns, vec!["idBranch", "avgLoanAmount"]);
        assert_eq!(
            averages(&bank_a),
            vec![
                ("10".to_string(), 100.0),
                ("10".to_string(), 150.0),
                ("10".to_string(), 300.0),
                ("11".to_string(), 50.0),
            ]
        );

        let bank_b = read_frame(&dir, "silver/B/202403/B_20240320.csv").await;
        assert_eq!(
            averages(&bank_b),
            vec![("20".to_string(), 60.0), ("20".to_string(), 80.0)]
        );

        assert_eq!(resolver.calls(), 1);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_zero_tables_fails_before_any_call() {
        let dir = TempDir::new().unwrap();
        let resolver = RecordingResolver::new(Some(SECRET));
        let opener = TestOpener::new(Pool::sqlite_in_memory().await.unwrap(), &dir);
        let config = march_config(Vec::new()).build().unwrap();

        let err = run_job(&config, &resolver, &opener).await.unwrap_err();

        assert!(matches!(err, JobError::Config(_)));
        assert_eq!(err.exit_code(), ExitCode::ConfigError);
        assert_eq!(resolver.calls(), 0);
        assert_eq!(opener.opened(), 0);
    }

    #[tokio::test]
    async fn test_secret_failure_never_opens_session() {
        let dir = TempDir::new().unwrap();
        let resolver = RecordingResolver::new(Some(r#"{"endpoint":"db"}"#));
        let opener = TestOpener::new(Pool::sqlite_in_memory().await.unwrap(), &dir);
        let config = march_config(all_tables()).build().unwrap();

        let err = run_job(&config, &resolver, &opener).await.unwrap_err();

        assert_eq!(err.exit_code(), ExitCode::SecretError);
        assert_eq!(opener.opened(), 0);
    }

    #[tokio::test]
    async fn test_transform_failure_still_closes_session() {
        let dir = TempDir::new().unwrap();
        let pool = setup_banking_db().await;
        let resolver = RecordingResolver::new(Some(SECRET));
        let opener = TestOpener::new(pool.clone(), &dir);
        // Only Loan lands, so the transform has no Bank data to join
        let config = march_config(vec!["Loan".to_string()]).build().unwrap();

        let err = run_job(&config, &resolver, &opener).await.unwrap_err();

        assert!(matches!(err, JobError::Transform { .. }));
        assert_eq!(err.exit_code(), ExitCode::TransformError);
        assert!(pool.is_closed());

        let store = LocalObjectStore::new(dir.path());
        assert!(
            store
                .exists("bronze/Loan/202403/Loan_monthly_data_extract.csv")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_extract_failure_stops_at_first_table() {
        let dir = TempDir::new().unwrap();
        let pool = setup_banking_db().await;
        let resolver = RecordingResolver::new(Some(SECRET));
        let opener = TestOpener::new(pool.clone(), &dir);
        let config = march_config(vec!["Missing".to_string(), "Bank".to_string()])
            .build()
            .unwrap();

        let err = run_job(&config, &resolver, &opener).await.unwrap_err();

        assert!(matches!(err, JobError::Extract { ref table, .. } if table == "Missing"));
        assert_eq!(err.exit_code(), ExitCode::ExtractError);
        assert!(pool.is_closed());

        let store = LocalObjectStore::new(dir.path());
        assert!(
            !store
                .exists("bronze/Bank/202403/Bank_monthly_data_extract.csv")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_keep_going_reports_every_failed_table() {
        let dir = TempDir::new().unwrap();
        let pool = setup_banking_db().await;
        let resolver = RecordingResolver::new(Some(SECRET));
        let opener = TestOpener::new(pool.clone(), &dir);
        let config = march_config(vec![
            "Missing".to_string(),
            "Bank".to_string(),
            "Gone".to_string(),
        ])
        .keep_going(true)
        .build()
        .unwrap();

        let err = run_job(&config, &resolver, &opener).await.unwrap_err();

        match err {
            JobError::ExtractMany { ref tables } => {
                assert_eq!(tables, &vec!["Missing".to_string(), "Gone".to_string()])
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(pool.is_closed());

        let store = LocalObjectStore::new(dir.path());
        assert!(
            store
                .exists("bronze/Bank/202403/Bank_monthly_data_extract.csv")
                .await
                .unwrap()
        );
        assert!(!store.exists("silver").await.unwrap());
    }

    #[tokio::test]
    async fn test_rerun_produces_identical_outputs() {
        let dir = TempDir::new().unwrap();
        let resolver = RecordingResolver::new(Some(SECRET));
        let config = march_config(all_tables()).build().unwrap();
        let store = LocalObjectStore::new(dir.path());

        let mut snapshots = Vec::new();
        for _ in 0..2 {
            // Each run closes its pool, so every run gets a fresh database
            let opener = TestOpener::new(setup_banking_db().await, &dir);
            let report = run_job(&config, &resolver, &opener).await.unwrap();

            let mut keys: Vec<String> = report.extracts.iter().map(|e| e.key.clone()).collect();
            keys.extend(report.transform.unwrap().files.into_iter().map(|f| f.key));

            let mut contents = Vec::new();
            for key in keys {
                contents.push((key.clone(), store.get(&key).await.unwrap()));
            }
            snapshots.push(contents);
        }

        assert_eq!(snapshots[0], snapshots[1]);
    }

    #[tokio::test]
    async fn test_skip_extract_transforms_existing_landing_data() {
        let dir = TempDir::new().unwrap();
        let resolver = RecordingResolver::new(Some(SECRET));

        let extract_only = march_config(all_tables())
            .skip_transform(true)
            .build()
            .unwrap();
        let opener = TestOpener::new(setup_banking_db().await, &dir);
        let report = run_job(&extract_only, &resolver, &opener).await.unwrap();
        assert_eq!(report.extracts.len(), 5);
        assert!(report.transform.is_none());

        let store = LocalObjectStore::new(dir.path());
        assert!(!store.exists("silver/A/202403/A_20240320.csv").await.unwrap());

        let transform_only = march_config(all_tables())
            .skip_extract(true)
            .build()
            .unwrap();
        let opener = TestOpener::new(Pool::sqlite_in_memory().await.unwrap(), &dir);
        let report = run_job(&transform_only, &resolver, &opener).await.unwrap();

        assert!(report.extracts.is_empty());
        assert_eq!(report.transform.unwrap().files.len(), 2);
        assert!(store.exists("silver/A/202403/A_20240320.csv").await.unwrap());
    }
}
