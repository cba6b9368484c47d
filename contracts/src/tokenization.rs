//! # Tokenization Factory
//!
//! Provisions one tokenization instance per listed property. An instance
//! represents fractional ownership of a single asset; the factory only
//! tracks its identity (handle, symbol, name, owner). Share and transfer
//! mechanics live elsewhere.
//!
//! ## Handles
//!
//! Each instance gets a 20-byte handle derived as
//! `BLAKE3(HANDLE_DOMAIN || owner || nonce)`, the way a contract address is
//! derived from its deployer and nonce. The nonce only ever increases and is
//! persisted with the instance table, so a handle is never issued twice, even
//! across restarts.
//!
//! ## Staging
//!
//! Creation is split into [`prepare`](TokenizationFactory::prepare), which
//! validates and builds the instance without touching the factory, and
//! [`publish`](TokenizationFactory::publish), which inserts it and cannot
//! fail. The registry uses the split to commit a listing and its instance
//! together or not at all.

use chrono::Utc;
use std::collections::HashMap;

use crate::config::{HANDLE_DOMAIN, HANDLE_LENGTH};
use crate::error::{ParcelError, ParcelResult};
use crate::types::{AccountId, TokenizationHandle, TokenizationInstance};

/// Arena of tokenization instances plus a handle index into it.
#[derive(Debug, Clone, Default)]
pub struct TokenizationFactory {
    /// Instances in creation order. `instances[i].sequence == i` is not
    /// guaranteed after a restore, only that sequences strictly increase.
    instances: Vec<TokenizationInstance>,
    /// Handle → position in `instances`.
    index: HashMap<TokenizationHandle, usize>,
    /// Nonce for the next instance.
    nonce: u64,
}

impl TokenizationFactory {
    /// Creates a new, empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a factory from persisted instances and its saved nonce.
    ///
    /// Instances are re-sorted by sequence. The nonce is raised past the
    /// highest restored sequence if the saved value lags behind it.
    pub fn restore(mut instances: Vec<TokenizationInstance>, nonce: u64) -> Self {
        instances.sort_by_key(|i| i.sequence);
        let floor = instances.last().map_or(0, |i| i.sequence.saturating_add(1));
        let index = instances
            .iter()
            .enumerate()
            .map(|(pos, instance)| (instance.handle, pos))
            .collect();
        Self {
            instances,
            index,
            nonce: nonce.max(floor),
        }
    }

    /// Validates the request and builds the next instance without storing it.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::ProvisionFailure`] if `symbol` or `name` is
    /// empty, `owner` is the null account, or the nonce space is exhausted.
    pub fn prepare(
        &self,
        symbol: &str,
        name: &str,
        owner: &AccountId,
    ) -> ParcelResult<TokenizationInstance> {
        if symbol.trim().is_empty() {
            return Err(ParcelError::ProvisionFailure("symbol is empty".into()));
        }
        if name.trim().is_empty() {
            return Err(ParcelError::ProvisionFailure("name is empty".into()));
        }
        if owner.is_null() {
            return Err(ParcelError::ProvisionFailure(
                "owner is the null account".into(),
            ));
        }
        if self.nonce == u64::MAX {
            return Err(ParcelError::ProvisionFailure(
                "factory nonce exhausted".into(),
            ));
        }

        let handle = derive_handle(owner, self.nonce);
        if self.index.contains_key(&handle) {
            return Err(ParcelError::ProvisionFailure(format!(
                "handle collision at nonce {}",
                self.nonce
            )));
        }

        Ok(TokenizationInstance {
            handle,
            sequence: self.nonce,
            symbol: symbol.to_string(),
            name: name.to_string(),
            owner: owner.clone(),
            created_at: Utc::now(),
        })
    }

    /// Stores an instance produced by [`prepare`](Self::prepare) and advances
    /// the nonce past it.
    ///
    /// Must be called with the most recently prepared instance, before any
    /// other mutation of the factory.
    pub fn publish(&mut self, instance: TokenizationInstance) -> TokenizationHandle {
        debug_assert_eq!(instance.sequence, self.nonce, "stale staged instance");
        let handle = instance.handle;
        self.nonce = instance.sequence + 1;
        self.index.insert(handle, self.instances.len());
        self.instances.push(instance);
        handle
    }

    /// Provisions a new instance and returns its handle.
    pub fn create(
        &mut self,
        symbol: &str,
        name: &str,
        owner: &AccountId,
    ) -> ParcelResult<TokenizationHandle> {
        let instance = self.prepare(symbol, name, owner)?;
        Ok(self.publish(instance))
    }

    /// Returns the symbol of the instance behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::NotFound`] for an unknown handle.
    pub fn symbol_of(&self, handle: &TokenizationHandle) -> ParcelResult<&str> {
        self.instance(handle)
            .map(|i| i.symbol.as_str())
            .ok_or_else(|| ParcelError::NotFound(format!("tokenization {handle}")))
    }

    /// Returns the instance behind `handle`, or `None`.
    pub fn instance(&self, handle: &TokenizationHandle) -> Option<&TokenizationInstance> {
        self.index.get(handle).map(|&pos| &self.instances[pos])
    }

    /// Number of instances provisioned.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Nonce the next instance will be created with.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

/// `BLAKE3(domain || owner || nonce_be)`, truncated to [`HANDLE_LENGTH`].
fn derive_handle(owner: &AccountId, nonce: u64) -> TokenizationHandle {
    let mut hasher = blake3::Hasher::new();
    hasher.update(HANDLE_DOMAIN);
    hasher.update(owner.as_str().as_bytes());
    hasher.update(&nonce.to_be_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; HANDLE_LENGTH];
    bytes.copy_from_slice(&digest.as_bytes()[..HANDLE_LENGTH]);
    TokenizationHandle::from_bytes(bytes)
}
