//! Persistence layer — SQLite-backed storage for lists and subscriptions.

pub mod db;
pub mod lists;

pub use db::Database;
pub use lists::ListStore;
