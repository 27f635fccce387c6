mod repository;

pub use repository::*;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for cash transfers
pub const MIGRATION_002_CASH_TRANSFERS: &str = include_str!("migrations/002_cash_transfers.sql");
