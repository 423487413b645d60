//! Index access: record model, backend contract and the concurrency-safe
//! gateway the sync engine talks to.

pub mod backend;
pub mod error;
pub mod gateway;
pub mod record;
pub mod schema;
pub mod tantivy;

pub use backend::{IndexBackend, IndexView, SearchHit};
pub use error::{BackendError, BackendResult};
pub use gateway::{Batch, IndexGateway};
pub use record::{ErrorDetails, IndexedRecord, Validation, fields};
pub use self::tantivy::TantivyBackend;
