//! Object storage abstraction for the landing and transformed areas

pub mod layout;
pub mod local_store;
pub mod object_store;
pub mod s3_store;
pub mod uri;

pub use layout::StorageLayout;
pub use local_store::LocalObjectStore;
pub use object_store::{ObjectStore, open_store};
pub use s3_store::S3ObjectStore;
pub use uri::StorageUri;
