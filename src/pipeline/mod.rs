//! Extract and transform stages of the monthly job

pub mod extract;
pub mod frame;
pub mod transform;
pub mod window;

pub use extract::{ExtractSummary, MonthlyExtractor, TableName};
pub use transform::{MonthlyTransformer, TransformOutcome, TransformPlan, TransformedFile};
