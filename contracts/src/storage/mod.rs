//! # Storage Module
//!
//! Durable persistence for the registry. The in-memory ledger, factory and
//! registry stay authoritative for reads; every mutation is written here
//! first and published in memory only once the write has landed.
//!
//! ```text
//! PropertyMarket ── append ──► payment_methods   (Batch)
//!        │
//!        └──── list ────► properties + tokenizations + metadata (transaction)
//! ```

pub mod db;

pub use db::{DbError, DbResult, ParcelDB, StoredState};
