//! # Payment Method Ledger
//!
//! Ordered, append-only list of the accounts accepted as payment for listed
//! properties. Entries are never removed and duplicates are kept: the ledger
//! records what was approved and in which order, nothing more.

use serde::{Deserialize, Serialize};

use crate::error::{ParcelError, ParcelResult};
use crate::types::PaymentMethod;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentMethodLedger {
    methods: Vec<PaymentMethod>,
}

impl PaymentMethodLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from previously persisted entries, in order.
    pub fn restore(methods: Vec<PaymentMethod>) -> Self {
        Self { methods }
    }

    /// Checks a batch without touching the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::InvalidInput`] if the batch is empty or contains
    /// the null account.
    pub fn validate(methods: &[PaymentMethod]) -> ParcelResult<()> {
        if methods.is_empty() {
            return Err(ParcelError::invalid(
                "payment_methods",
                "must contain at least one entry",
            ));
        }
        if let Some(pos) = methods.iter().position(PaymentMethod::is_null) {
            return Err(ParcelError::invalid(
                "payment_methods",
                format!("entry {pos} is the null account"),
            ));
        }
        Ok(())
    }

    /// Appends every method in order and returns the new ledger length.
    ///
    /// All-or-nothing: a rejected batch appends nothing.
    pub fn append(&mut self, methods: Vec<PaymentMethod>) -> ParcelResult<usize> {
        Self::validate(&methods)?;
        self.methods.extend(methods);
        Ok(self.methods.len())
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PaymentMethod> {
        self.methods.get(index)
    }

    /// Returns `true` if `method` has been approved at least once.
    pub fn is_accepted(&self, method: &PaymentMethod) -> bool {
        self.methods.contains(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PaymentMethod> {
        self.methods.iter()
    }
}
