// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Parcel — Property Registry Contracts
//!
//! The registry side of Parcel: approved payment methods, listed properties,
//! and one tokenization instance per property representing fractional
//! ownership of that single asset.
//!
//! - **Payment Methods** — append-only ledger of accounts accepted as
//!   payment.
//! - **Tokenization** — factory issuing opaque, never-reused handles for
//!   per-property tokenization instances.
//! - **Property Registry** — sequential ids starting at 1, one record per id,
//!   each pointing at its tokenization instance.
//! - **Market** — composition root owning all three behind single-writer
//!   locks, optionally persisted through [`storage::ParcelDB`].
//!
//! ## Design Principles
//!
//! 1. All-or-nothing: a failed call leaves every counter and table as it was.
//! 2. Stage, persist, then publish. Nothing half-applied is ever visible.
//! 3. No hidden singletons. Whoever needs a market builds one.
//! 4. Every public type is serializable (serde) for the API and for sled.

pub mod config;
pub mod error;
pub mod market;
pub mod payment_methods;
pub mod property_registry;
pub mod storage;
pub mod tokenization;
pub mod types;

pub use error::{ParcelError, ParcelResult};
pub use market::PropertyMarket;
pub use types::{
    AccountId, PaymentMethod, PropertyId, PropertyListing, PropertyRecord, TokenizationHandle,
    TokenizationInstance,
};
