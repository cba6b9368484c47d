//! # Property Market
//!
//! The composition root that owns one payment-method ledger, one
//! tokenization factory and one property registry. Callers construct it
//! explicitly (in memory, or over a [`ParcelDB`]) and share it behind an
//! `Arc`; there is no global instance.
//!
//! ## Concurrency
//!
//! The ledger and the listings (factory + registry) each sit behind their own
//! `RwLock`. A mutation holds the write lock for its whole
//! validate → persist → publish sequence, so readers see either the state
//! before a listing or the state after it, never an id without a record or a
//! record without its tokenization instance.
//!
//! ## Durability
//!
//! With a database attached, the durable write happens before the in-memory
//! publish. If the write fails, memory is untouched and the error is
//! returned as [`ParcelError::Storage`].

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ParcelError, ParcelResult};
use crate::payment_methods::PaymentMethodLedger;
use crate::property_registry::PropertyRegistry;
use crate::storage::{DbError, ParcelDB};
use crate::tokenization::TokenizationFactory;
use crate::types::{
    PaymentMethod, PropertyId, PropertyListing, PropertyRecord, TokenizationHandle,
    TokenizationInstance,
};

/// Factory and registry, mutated together under one lock.
#[derive(Debug, Default)]
struct Listings {
    factory: TokenizationFactory,
    registry: PropertyRegistry,
}

#[derive(Debug)]
pub struct PropertyMarket {
    ledger: RwLock<PaymentMethodLedger>,
    listings: RwLock<Listings>,
    db: Option<ParcelDB>,
}

impl PropertyMarket {
    /// Creates an empty, memory-only market. Nothing survives a drop.
    pub fn new() -> Self {
        Self {
            ledger: RwLock::new(PaymentMethodLedger::new()),
            listings: RwLock::new(Listings::default()),
            db: None,
        }
    }

    /// Opens a market backed by `db`, restoring everything it holds.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::Storage`] if the stored state cannot be read or
    /// is inconsistent (a record whose tokenization instance is missing).
    pub fn open(db: ParcelDB) -> ParcelResult<Self> {
        let stored = db.load()?;

        let factory = TokenizationFactory::restore(
            stored.tokenizations,
            stored.factory_nonce.unwrap_or(0),
        );
        for record in &stored.properties {
            if factory.instance(&record.tokenization).is_none() {
                return Err(DbError::Corrupted(format!(
                    "property {} references unknown tokenization {}",
                    record.id, record.tokenization
                ))
                .into());
            }
        }
        let registry = PropertyRegistry::restore(
            stored.properties,
            stored.next_property_id.unwrap_or(0),
        );
        let ledger = PaymentMethodLedger::restore(stored.payment_methods);

        info!(
            payment_methods = ledger.len(),
            properties = registry.len(),
            current_property_id = registry.current_id(),
            tokenizations = factory.len(),
            "property market restored"
        );

        Ok(Self {
            ledger: RwLock::new(ledger),
            listings: RwLock::new(Listings { factory, registry }),
            db: Some(db),
        })
    }

    /// Whether mutations are persisted.
    pub fn is_durable(&self) -> bool {
        self.db.is_some()
    }

    // -- Payment methods ----------------------------------------------------

    /// Approves a batch of payment methods and returns the new ledger length.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::InvalidInput`] if the batch is empty or contains
    /// the null account. Nothing is appended in that case.
    pub fn add_payment_methods(&self, methods: Vec<PaymentMethod>) -> ParcelResult<usize> {
        let mut ledger = self.ledger.write();

        if let Err(err) = PaymentMethodLedger::validate(&methods) {
            warn!(error = %err, "payment methods rejected");
            return Err(err);
        }
        if let Some(db) = &self.db {
            db.append_payment_methods(ledger.len() as u64, &methods)?;
        }

        let added = methods.len();
        let total = ledger.append(methods)?;
        info!(added, total, "payment methods added");
        Ok(total)
    }

    pub fn payment_method_count(&self) -> usize {
        self.ledger.read().len()
    }

    /// Snapshot of the ledger, in approval order.
    pub fn payment_methods(&self) -> Vec<PaymentMethod> {
        self.ledger.read().iter().cloned().collect()
    }

    pub fn is_payment_method_accepted(&self, method: &PaymentMethod) -> bool {
        self.ledger.read().is_accepted(method)
    }

    // -- Listings -----------------------------------------------------------

    /// Lists a property, provisions its tokenization instance, and returns
    /// the new property id.
    ///
    /// # Errors
    ///
    /// - [`ParcelError::InvalidInput`] for an empty field or null owner.
    /// - [`ParcelError::ProvisionFailure`] if the factory refuses.
    /// - [`ParcelError::Storage`] if the durable write fails.
    ///
    /// On every error no id is consumed and nothing is stored.
    pub fn list_property(&self, listing: PropertyListing) -> ParcelResult<PropertyId> {
        let mut guard = self.listings.write();
        let listings = &mut *guard;

        let staged = match listings.registry.stage(listing, &listings.factory) {
            Ok(staged) => staged,
            Err(err) => {
                warn!(error = %err, kind = err.kind(), "listing rejected");
                return Err(err);
            }
        };

        if let Some(db) = &self.db {
            db.commit_listing(&staged.record, &staged.instance)?;
        }

        let symbol = staged.record.symbol.clone();
        let handle = staged.instance.handle;
        let id = listings.registry.publish(staged, &mut listings.factory);

        info!(
            property_id = id,
            symbol = %symbol,
            tokenization = %handle,
            "property listed"
        );
        Ok(id)
    }

    /// Returns a copy of the record for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::NotFound`] for 0 or any id not yet issued.
    pub fn get_property(&self, id: PropertyId) -> ParcelResult<PropertyRecord> {
        let listings = self.listings.read();
        let record = listings.registry.get(id).cloned();
        if record.is_err() {
            debug!(property_id = id, "property lookup missed");
        }
        record
    }

    /// The most recently assigned property id, or 0.
    pub fn current_property_id(&self) -> PropertyId {
        self.listings.read().registry.current_id()
    }

    pub fn property_count(&self) -> usize {
        self.listings.read().registry.len()
    }

    /// Snapshot of every record, ascending by id.
    pub fn properties(&self) -> Vec<PropertyRecord> {
        self.listings.read().registry.records().cloned().collect()
    }

    // -- Tokenization -------------------------------------------------------

    /// Returns the symbol of the tokenization instance behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::NotFound`] for an unknown handle.
    pub fn instance_symbol(&self, handle: &TokenizationHandle) -> ParcelResult<String> {
        self.listings
            .read()
            .factory
            .symbol_of(handle)
            .map(str::to_string)
    }

    /// Returns a copy of the tokenization instance behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::NotFound`] for an unknown handle.
    pub fn tokenization(&self, handle: &TokenizationHandle) -> ParcelResult<TokenizationInstance> {
        self.listings
            .read()
            .factory
            .instance(handle)
            .cloned()
            .ok_or_else(|| ParcelError::NotFound(format!("tokenization {handle}")))
    }
}

impl Default for PropertyMarket {
    fn default() -> Self {
        Self::new()
    }
}
