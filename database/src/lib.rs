pub mod guard;
pub mod sqlite;
pub mod store;


pub use guard::DedupGuard;
pub use sqlite::Database;
pub use store::{LedgerEntry, MemoryStore, MentionStore};
