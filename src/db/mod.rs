//! SQLite persistence for the pool ledger.
//!
//! This module provides:
//! - Database initialization and schema setup
//! - The `Repository`, which loads pool books and commits each engine
//!   operation in a single transaction

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{RefundReason, RefundRow, RefundStatus, Repository};
