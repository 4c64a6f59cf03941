//! Database layer - connection properties, pooling, and row rendering

pub mod pool;
pub mod rows;

pub use pool::{ConnectionProperties, Pool};
pub use rows::RowSet;
