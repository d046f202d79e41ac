pub mod conformance;
mod error;
mod jsonl;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use jsonl::JsonlOutbox;
pub use memory::MemoryOutbox;
pub use record::{OutboxRecord, OutboxStatus, SyncMethod};
pub use traits::OutboxStore;
