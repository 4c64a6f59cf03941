//! Error taxonomy and process exit codes for the job driver.
//!
//! Components work with `anyhow::Result` internally and are converted into a
//! [`JobError`] at their boundary, so the driver can tell failure classes apart
//! and `main` can map each one to a distinct exit code.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that terminate (or degrade) a job run.
///
/// Display strings carry only the failing stage; the underlying cause is kept
/// as the error source so `{:#}` on an `anyhow::Error` prints the full chain.
#[derive(Error, Debug)]
pub enum JobError {
    /// Invalid or missing job input, detected before any work starts
    #[error("configuration error: {0}")]
    Config(String),

    /// Secret store lookup or secret payload problem
    #[error("failed to resolve secret '{secret_id}'")]
    Secret {
        secret_id: String,
        #[source]
        source: BoxError,
    },

    /// Connection pool or object store could not be opened
    #[error("failed to open job session")]
    Session {
        #[source]
        source: BoxError,
    },

    /// Query or landing write failed for one table
    #[error("extraction failed for table {table}")]
    Extract {
        table: String,
        #[source]
        source: BoxError,
    },

    /// Several tables failed while running with `keep_going`
    #[error("extraction failed for {} table(s): {}", .tables.len(), .tables.join(", "))]
    ExtractMany { tables: Vec<String> },

    /// Load, join, window or write failure in the transform stage
    #[error("transform failed")]
    Transform {
        #[source]
        source: BoxError,
    },
}

impl JobError {
    pub fn secret(secret_id: impl Into<String>, err: anyhow::Error) -> Self {
        JobError::Secret {
            secret_id: secret_id.into(),
            source: err.into(),
        }
    }

    pub fn session(err: anyhow::Error) -> Self {
        JobError::Session { source: err.into() }
    }

    pub fn extract(table: impl Into<String>, err: anyhow::Error) -> Self {
        JobError::Extract {
            table: table.into(),
            source: err.into(),
        }
    }

    pub fn transform(err: anyhow::Error) -> Self {
        JobError::Transform { source: err.into() }
    }

    /// Exit code the process should terminate with for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            JobError::Config(_) => ExitCode::ConfigError,
            JobError::Secret { .. } => ExitCode::SecretError,
            JobError::Session { .. } => ExitCode::SessionError,
            JobError::Extract { .. } | JobError::ExtractMany { .. } => ExitCode::ExtractError,
            JobError::Transform { .. } => ExitCode::TransformError,
        }
    }
}

/// Process exit codes, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Unexpected failure outside the job taxonomy
    Internal = 1,

    ConfigError = 2,

    SecretError = 3,

    SessionError = 4,

    ExtractError = 5,

    /// Extraction succeeded but the transform stage did not
    TransformError = 6,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
