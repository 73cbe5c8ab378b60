//! Airgap Core: viewing-key wallet with an air-gapped QR signer
//!
//! The wallet holds only viewing keys. Every spend is encoded as a
//! sign-request QR, signed on the offline device and scanned back as a
//! signature QR before the adapter broadcasts it.
//!
//! # Architecture
//!
//! - **QR protocol**: `[0x53, chain, type]` framed messages for the substrate,
//!   penumbra, zcash and cosmos families
//! - **Keys**: BIP32 (secp256k1) and SLIP-10 (ed25519) derivation plus address
//!   encoders, used on the signer side and for cross-checks
//! - **Adapters**: one `NetworkAdapter` per network behind a lazy registry
//! - **Light client**: substrate chains over an embedded light-client runtime,
//!   with parachains composed onto their relay
//! - **Metadata**: merkleized runtime metadata and per-call proofs
//! - **Balances**: TTL cache with dormancy detection and background refresh
//!
//! # Example
//!
//! ```ignore
//! use airgap_core::{AdapterRegistry, DefaultAdapterFactory, NetworkId, WalletRecord};
//!
//! let wallet = WalletRecord::from_export_hex(&scanned_hex)?;
//! let registry = AdapterRegistry::new(Arc::new(factory));
//!
//! let adapter = registry.get(NetworkId::CosmosHub).await?;
//! let mut pending = adapter.build_send_transaction(&wallet, params).await?;
//! show_qr(&pending.sign_request_hex);
//!
//! let tx_hash = adapter
//!     .complete_send_transaction(&mut pending, &signature_hex)
//!     .await?;
//! ```

// Public modules
pub mod adapter;
pub mod balance;
pub mod codec;
pub mod config;
pub mod error;
pub mod hashing;
pub mod keys;
pub mod lightclient;
pub mod metadata;
pub mod qr;
pub mod wallet;

// Re-exports for convenience
pub use adapter::{
    AdapterFactory, AdapterRegistry, Balance, DefaultAdapterFactory, NetworkAdapter, NetworkId,
    SendParams, SyncProgress, TransactionSummary,
};
pub use balance::{BalanceCache, BalanceService};
pub use config::CoreConfig;
pub use error::{
    AdapterError, CodecError, CoreError, KeyError, LightClientError, MetadataError, QrError,
    TransactionError, WalletError,
};
pub use lightclient::{ConnectionState, ConnectionStatus, LightClientBackend, LightClientRegistry};
pub use metadata::{
    MerkleizedMetadata, MetadataCache, MetadataDecoder, MetadataProof, ScaleMetadataDecoder,
};
pub use qr::{decode_qr, decode_qr_hex, detect_chain, detect_message_type, ChainFamily, QrMessage};
pub use wallet::{PendingTransaction, TxStatus, WalletRecord};

pub type Result<T> = std::result::Result<T, CoreError>;
