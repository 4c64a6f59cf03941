use bank_loan_etl::calendar::parse_run_date;
use bank_loan_etl::config::{
    DEFAULT_BASE_URI, DEFAULT_DATE_COLUMN, DEFAULT_LANDING_AREA, DEFAULT_SECRET_ID,
    DEFAULT_TRANSFORM_AREA, JobConfigBuilder,
};
use bank_loan_etl::error::{ExitCode, JobError};
use bank_loan_etl::runner::{JobReport, run};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser, Clone)]
#[command(version, about = "Monthly banking extract and loan-average transform")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Extract the run month for each table, then build per-bank outputs
    Run {
        /// Source tables to extract, in order
        #[arg(required = true)]
        tables: Vec<String>,

        /// Secrets Manager id holding the database credentials
        #[arg(long, env = "BANK_ETL_SECRET_ID", default_value = DEFAULT_SECRET_ID)]
        secret_id: String,

        /// AWS region (default provider chain if not specified)
        #[arg(short, long, env = "BANK_ETL_REGION")]
        region: Option<String>,

        /// Storage base: s3://bucket[/prefix], file:// URI or local directory
        #[arg(short, long, env = "BANK_ETL_BASE_URI", default_value = DEFAULT_BASE_URI)]
        base_uri: String,

        /// Area receiving the raw monthly extracts
        #[arg(long, default_value = DEFAULT_LANDING_AREA)]
        landing_area: String,

        /// Area receiving the per-bank outputs
        #[arg(long, default_value = DEFAULT_TRANSFORM_AREA)]
        transform_area: String,

        /// Database name (overrides the secret's dbname)
        #[arg(short, long, env = "BANK_ETL_DATABASE")]
        database: Option<String>,

        /// Database port (overrides the secret's port)
        #[arg(short, long, env = "BANK_ETL_DB_PORT")]
        port: Option<u16>,

        /// Column every table is filtered on
        #[arg(long, default_value = DEFAULT_DATE_COLUMN)]
        date_column: String,

        /// Run as of this day (YYYY-MM-DD); defaults to today
        #[arg(long, env = "BANK_ETL_RUN_DATE", value_parser = parse_date_arg)]
        run_date: Option<NaiveDate>,

        /// Keep extracting remaining tables after a failure
        #[arg(long)]
        keep_going: bool,

        /// Only run the transform over existing landing data
        #[arg(long)]
        skip_extract: bool,

        /// Only run the extraction
        #[arg(long)]
        skip_transform: bool,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    parse_run_date(value).map_err(|e| format!("{:#}", e))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let code = match args.command {
        Command::Run {
            tables,
            secret_id,
            region,
            base_uri,
            landing_area,
            transform_area,
            database,
            port,
            date_column,
            run_date,
            keep_going,
            skip_extract,
            skip_transform,
            quiet,
        } => {
            init_tracing(quiet);

            let mut builder = JobConfigBuilder::default();
            builder
                .tables(tables)
                .secret_id(secret_id)
                .base_uri(base_uri)
                .landing_area(landing_area)
                .transform_area(transform_area)
                .date_column(date_column)
                .keep_going(keep_going)
                .skip_extract(skip_extract)
                .skip_transform(skip_transform);
            if let Some(region) = region {
                builder.region(region);
            }
            if let Some(database) = database {
                builder.database(database);
            }
            if let Some(port) = port {
                builder.port(port);
            }
            if let Some(run_date) = run_date {
                builder.run_date(run_date);
            }

            match builder.build() {
                Ok(config) => {
                    if !quiet {
                        println!("Banking Monthly ETL");
                        println!("===================");
                        println!("Tables: {}", config.tables.join(", "));
                        println!("Base: {}", config.base_uri);
                        println!("Run date: {}", config.run_date);
                        println!();
                    }
                    report_outcome(run(&config).await)
                }
                Err(e) => {
                    // Every field has a default, so this is a programming error
                    eprintln!("Error: failed to assemble job configuration: {}", e);
                    ExitCode::Internal
                }
            }
        }
    };

    std::process::exit(code.as_i32());
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if quiet {
        EnvFilter::new("bank_loan_etl=warn,sqlx=off")
    } else {
        EnvFilter::new("bank_loan_etl=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn report_outcome(outcome: Result<JobReport, JobError>) -> ExitCode {
    match outcome {
        Ok(report) => {
            print_summary(&report);
            ExitCode::Success
        }
        Err(e) => {
            let code = e.exit_code();
            eprintln!("Error: {:#}", anyhow::Error::from(e));
            code
        }
    }
}

fn print_summary(report: &JobReport) {
    println!();
    println!("Run Summary");
    println!("===========");
    println!("Run ID: {}", report.run_id);
    println!("Window: {}", report.window);
    println!("Tables extracted: {}", report.stats.tables_extracted);
    println!("Rows extracted: {}", report.stats.rows_extracted);
    println!("Bytes written: {}", report.stats.bytes_written);
    for summary in &report.extracts {
        println!("  {} -> {} ({} rows)", summary.table, summary.key, summary.rows);
    }
    if let (Some(median), Some(slowest)) = (
        report.stats.percentile(50.0),
        report.stats.slowest_extract_ms(),
    ) {
        println!("Extract time: p50 {} ms, max {} ms", median, slowest);
    }
    match &report.transform {
        Some(outcome) => {
            println!("Joined rows: {}", outcome.joined_rows);
            println!("Bank files written: {}", report.stats.files_written);
            if let Some(ms) = report.stats.transform_duration_ms {
                println!("Transform time: {} ms", ms);
            }
            for file in &outcome.files {
                println!("  {} -> {} ({} rows)", file.bank_name, file.key, file.rows);
            }
        }
        None => println!("Transform: skipped"),
    }
    println!("Duration: {:.2}s", report.duration.as_secs_f64());
}
