//! Durable per-day audit log of predictions

pub mod appender;
pub mod daily_log;
pub mod store;

pub use appender::{AppendOutcome, AuditLogAppender};
pub use daily_log::{daily_log_key, AuditRecord, DailyLog};
pub use store::{FsObjectStore, MemoryObjectStore, ObjectStore, Precondition, StoredObject};
