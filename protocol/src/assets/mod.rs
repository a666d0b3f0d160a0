//! # Asset Plugins
//!
//! One module per registered transaction type:
//!
//! ```text
//! transfer.rs        - type 0, value transfer (lock-restricted)
//! signature.rs       - type 1, second-signature registration
//! multisignature.rs  - type 4, multisignature group registration
//! diff.rs            - +key / -key list helpers shared by the above
//! ```
//!
//! [`default_registry`] wires all of them up the way a node runs.

pub mod diff;
pub mod multisignature;
pub mod signature;
pub mod transfer;

use std::sync::Arc;

pub use multisignature::{MultisignatureAsset, MultisignatureAssetData};
pub use signature::{SecondSignatureAsset, SignatureAssetData};
pub use transfer::TransferAsset;

use crate::transaction::plugin::AssetRegistry;

/// Registry with every built-in asset type.
pub fn default_registry() -> AssetRegistry {
    AssetRegistry::new()
        .register(Arc::new(TransferAsset))
        .register(Arc::new(SecondSignatureAsset))
        .register(Arc::new(MultisignatureAsset::new()))
}
