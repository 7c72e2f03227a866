//! Repository implementations using `SQLite`.
//!
//! These implementations encapsulate all SQL queries and database access.
//! The `SqlitePool` is confined to this module and never exposed through
//! the port trait signatures.

mod sqlite_task_state_repository;

pub use sqlite_task_state_repository::SqliteTaskStateRepository;
