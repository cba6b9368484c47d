//! # Core Types
//!
//! Identifiers and records shared across the ledger, factory and registry.
//! Everything here is plain data: serializable for the API and for sled,
//! cheap to clone, and free of any locking concerns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::HANDLE_LENGTH;
use crate::error::{ParcelError, ParcelResult};

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// An opaque account identifier, typically a hex address such as
/// `0x675bE6d0B35117D21C538d3363C5DB7699658157`.
///
/// The registry never interprets the value beyond detecting the null
/// identifier: an empty string, or `0x`/`0` followed only by zeros.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

/// A payment method is an account accepted as consideration for
/// property-related payments.
pub type PaymentMethod = AccountId;

impl AccountId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the null/zero identifier.
    pub fn is_null(&self) -> bool {
        let trimmed = self.0.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        digits.chars().all(|c| c == '0')
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Property identifiers
// ---------------------------------------------------------------------------

/// Sequential property identifier. `0` is never issued.
pub type PropertyId = u64;

// ---------------------------------------------------------------------------
// TokenizationHandle
// ---------------------------------------------------------------------------

/// Opaque, never-reused identity of a tokenization instance.
///
/// Rendered as `0x`-prefixed lowercase hex, like the contract address it
/// stands in for. Serializes as that hex string in JSON and bincode alike.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenizationHandle([u8; HANDLE_LENGTH]);

impl TokenizationHandle {
    pub fn from_bytes(bytes: [u8; HANDLE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HANDLE_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for TokenizationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TokenizationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenizationHandle({})", self.to_hex())
    }
}

impl FromStr for TokenizationHandle {
    type Err = ParcelError;

    fn from_str(s: &str) -> ParcelResult<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| ParcelError::invalid("handle", format!("is not hex: {e}")))?;
        let bytes: [u8; HANDLE_LENGTH] = bytes.try_into().map_err(|v: Vec<u8>| {
            ParcelError::invalid(
                "handle",
                format!("must be {HANDLE_LENGTH} bytes, got {}", v.len()),
            )
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for TokenizationHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TokenizationHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Listing input
// ---------------------------------------------------------------------------

/// Everything a caller supplies to list a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyListing {
    /// Land-registry number of the parcel. Must be non-zero.
    pub registration_number: u64,
    /// Land-registry code, e.g. `AQR696969HEY`.
    pub registration_code: String,
    /// Display name of the property.
    pub name: String,
    /// Ticker symbol of the property's tokenization instance.
    pub symbol: String,
    /// Location of the off-registry metadata document (`ipfs://…`).
    #[serde(alias = "metadataURI")]
    pub metadata_uri: String,
    /// Account that owns the property and its tokenization instance.
    pub owner: AccountId,
    /// Whether the registration has been verified off-registry.
    pub verified: bool,
}

impl PropertyListing {
    /// Checks every caller-supplied field.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError::InvalidInput`] naming the first bad field.
    pub fn validate(&self) -> ParcelResult<()> {
        if self.registration_number == 0 {
            return Err(ParcelError::invalid(
                "registration_number",
                "must be non-zero",
            ));
        }
        let text_fields = [
            ("registration_code", &self.registration_code),
            ("name", &self.name),
            ("symbol", &self.symbol),
            ("metadata_uri", &self.metadata_uri),
        ];
        for (field, value) in text_fields {
            if value.trim().is_empty() {
                return Err(ParcelError::invalid(field, "must not be empty"));
            }
        }
        if self.owner.is_null() {
            return Err(ParcelError::invalid("owner", "must not be the null account"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

/// The registry's stored representation of one listed property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub id: PropertyId,
    pub registration_number: u64,
    pub registration_code: String,
    pub name: String,
    pub symbol: String,
    pub metadata_uri: String,
    pub owner: AccountId,
    pub verified: bool,
    /// Handle of the tokenization instance provisioned for this property.
    /// Set once at listing time.
    pub tokenization: TokenizationHandle,
    pub listed_at: DateTime<Utc>,
}

/// An isolated unit representing fractional ownership of one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenizationInstance {
    pub handle: TokenizationHandle,
    /// Factory nonce that produced this instance; also its arena slot.
    pub sequence: u64,
    pub symbol: String,
    pub name: String,
    pub owner: AccountId,
    pub created_at: DateTime<Utc>,
}
