// Repository implementations (data access layer)
// Adapters that implement domain repository interfaces

pub mod in_memory_run_repository;
pub mod sqlite_run_repository;

pub use in_memory_run_repository::{InMemoryRunRepository, StoredAgent, StoredRun};
pub use sqlite_run_repository::SqliteRunRepository;
