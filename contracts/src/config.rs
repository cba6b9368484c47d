//! # Registry Configuration & Constants
//!
//! Fixed parameters for the Parcel registry. Runtime settings (ports, data
//! directory, log format) are command-line arguments on the node; anything
//! that changes the meaning of persisted data lives here instead.

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Registry version reported by the node's `/status` endpoint and
/// `parcel_version` RPC method.
pub const REGISTRY_VERSION: &str = "0.1.0";

/// On-disk schema version. Written to the `metadata` tree on first open and
/// checked on every subsequent open.
pub const STORAGE_SCHEMA_VERSION: u64 = 1;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// The first property id the registry issues. Zero means "nothing listed".
pub const FIRST_PROPERTY_ID: u64 = 1;

/// Length of a tokenization handle in bytes. Same width as an EVM address so
/// handles read like the contract addresses they replace.
pub const HANDLE_LENGTH: usize = 20;

/// Domain separation tag mixed into every handle derivation.
pub const HANDLE_DOMAIN: &[u8] = b"parcel/tokenization/v1";

// ---------------------------------------------------------------------------
// Node defaults
// ---------------------------------------------------------------------------

/// Default port for the JSON-RPC and REST API.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_id_is_not_the_sentinel() {
        assert!(FIRST_PROPERTY_ID > 0);
    }

    #[test]
    fn test_handle_fits_in_blake3_output() {
        assert!(HANDLE_LENGTH <= blake3::OUT_LEN);
        assert!(!HANDLE_DOMAIN.is_empty());
    }

    #[test]
    fn test_ports_do_not_collide() {
        assert_ne!(DEFAULT_RPC_PORT, DEFAULT_METRICS_PORT);
    }
}
