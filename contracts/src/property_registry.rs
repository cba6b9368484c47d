//! # Property Registry
//!
//! Assigns sequential ids to listed properties and keeps one record per id.
//! Every successful listing provisions a tokenization instance through the
//! [`TokenizationFactory`] and stores the returned handle on the record.
//!
//! ## Lifecycle
//!
//! The registry has a single counter, `next_id`, starting at 1, and an
//! id-keyed record map. A successful listing adds exactly one record and
//! advances the counter by exactly one. A failed listing changes neither,
//! and leaves the factory untouched.

use chrono::Utc;
use std::collections::BTreeMap;

use crate::config::FIRST_PROPERTY_ID;
use crate::error::{ParcelError, ParcelResult};
use crate::tokenization::TokenizationFactory;
use crate::types::{PropertyId, PropertyListing, PropertyRecord, TokenizationInstance};

/// A validated listing and its tokenization instance, built but not yet
/// visible to anyone.
#[derive(Debug, Clone)]
pub struct StagedListing {
    pub record: PropertyRecord,
    pub instance: TokenizationInstance,
}

impl StagedListing {
    pub fn id(&self) -> PropertyId {
        self.record.id
    }
}

#[derive(Debug, Clone)]
pub struct PropertyRegistry {
    records: BTreeMap<PropertyId, PropertyRecord>,
    next_id: PropertyId,
}

impl PropertyRegistry {
    /// Creates an empty registry. The first listing receives id 1.
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: FIRST_PROPERTY_ID,
        }
    }

    /// Rebuilds a registry from persisted records and its saved counter.
    ///
    /// The counter is raised past the highest restored id if it lags.
    pub fn restore(records: Vec<PropertyRecord>, next_id: PropertyId) -> Self {
        let records: BTreeMap<_, _> = records.into_iter().map(|r| (r.id, r)).collect();
        let floor = records
            .keys()
            .next_back()
            .map_or(FIRST_PROPERTY_ID, |id| id.saturating_add(1));
        Self {
            records,
            next_id: next_id.max(floor),
        }
    }

    /// Validates a listing and builds its record and tokenization instance
    /// without mutating the registry or the factory.
    ///
    /// # Errors
    ///
    /// - [`ParcelError::InvalidInput`] if any listing field is empty or the
    ///   owner is the null account.
    /// - [`ParcelError::ProvisionFailure`] if the factory refuses the instance.
    pub fn stage(
        &self,
        listing: PropertyListing,
        factory: &TokenizationFactory,
    ) -> ParcelResult<StagedListing> {
        listing.validate()?;

        if self.next_id == PropertyId::MAX {
            return Err(ParcelError::invalid("property_id", "id space exhausted"));
        }

        let instance = factory.prepare(&listing.symbol, &listing.name, &listing.owner)?;

        let record = PropertyRecord {
            id: self.next_id,
            registration_number: listing.registration_number,
            registration_code: listing.registration_code,
            name: listing.name,
            symbol: listing.symbol,
            metadata_uri: listing.metadata_uri,
            owner: listing.owner,
            verified: listing.verified,
            tokenization: instance.handle,
            listed_at: Utc::now(),
        };

        Ok(StagedListing { record, instance })
    }

    /// Makes a staged listing visible: the instance goes into the factory,
    /// the record into the registry, and the counter advances.
    ///
    /// The staged listing must come from [`stage`](Self::stage) on this
    /// registry and factory with no mutation in between.
    pub fn publish(
        &mut self,
        staged: StagedListing,
        factory: &mut TokenizationFactory,
    ) -> PropertyId {
        let StagedListing { record, instance } = staged;
        debug_assert_eq!(record.id, self.next_id, "stale staged listing");
        factory.publish(instance);
        let id = record.id;
        self.records.insert(id, record);
        self.next_id = id + 1;
        id
    }

    /// Lists a property and returns its id.
    pub fn list_property(
        &mut self,
        listing: PropertyListing,
        factory: &mut TokenizationFactory,
    ) -> ParcelResult<PropertyId> {
        let staged = self.stage(listing, factory)?;
        Ok(self.publish(staged, factory))
    }

    /// Returns the record for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::NotFound`] for id 0 or any id not yet issued.
    pub fn get(&self, id: PropertyId) -> ParcelResult<&PropertyRecord> {
        self.records
            .get(&id)
            .ok_or_else(|| ParcelError::NotFound(format!("property {id}")))
    }

    /// The most recently assigned id, or 0 if nothing has been listed.
    pub fn current_id(&self) -> PropertyId {
        self.next_id - 1
    }

    /// The id the next successful listing will receive.
    pub fn next_id(&self) -> PropertyId {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending id order.
    pub fn records(&self) -> impl Iterator<Item = &PropertyRecord> {
        self.records.values()
    }
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
