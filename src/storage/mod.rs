//! SQLite storage.

mod db;

pub use db::Database;
