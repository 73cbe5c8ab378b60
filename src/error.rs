//! Error types for the wallet core
//!
//! Each layer owns a narrow error enum; `CoreError` wraps them for callers
//! that cross module boundaries (the adapters, the inspector binary).

use thiserror::Error;

use crate::qr::{ChainFamily, MessageKind};

/// Byte-level decoding and encoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Truncated input: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Field too long: {len} bytes does not fit a {width}-byte length prefix")]
    FieldTooLong { len: usize, width: usize },

    #[error("Invalid UTF-8 in field: {0}")]
    InvalidUtf8(String),

    #[error("Trailing bytes: {0} unread bytes after message end")]
    TrailingBytes(usize),

    #[error("Invalid compact integer: {0}")]
    InvalidCompact(String),
}

/// QR payload errors.
///
/// `WrongChain` and `WrongMessageType` mean the payload was well-formed but
/// meant for another call site ("wrong QR code"); everything else means the
/// bytes themselves are bad ("corrupt QR code").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrError {
    #[error("Malformed QR payload: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid QR prelude: {0}")]
    BadPrelude(String),

    #[error("Payload too short for {kind:?}: {len} bytes, minimum {min}")]
    TooShort {
        kind: MessageKind,
        len: usize,
        min: usize,
    },

    #[error("Unknown chain/message combination: chain=0x{chain:02x}, type=0x{message_type:02x}")]
    UnknownMessage { chain: u8, message_type: u8 },

    #[error("Wrong chain: expected {expected:?}, found {found:?}")]
    WrongChain {
        expected: ChainFamily,
        found: ChainFamily,
    },

    #[error("Wrong message type: expected {expected:?}, found {found:?}")]
    WrongMessageType {
        expected: MessageKind,
        found: MessageKind,
    },

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl QrError {
    /// True when the payload is valid but addressed to another chain or flow.
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(
            self,
            Self::WrongChain { .. } | Self::WrongMessageType { .. } | Self::UnknownMessage { .. }
        )
    }

    pub(crate) fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Key derivation and address encoding errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid seed length: {0} bytes")]
    InvalidSeed(usize),

    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Non-hardened derivation is undefined for ed25519 (index {0})")]
    HardenedOnly(u32),

    #[error("Hardened derivation requires a private key (index {0})")]
    HardenedFromPublic(u32),

    #[error("Derived key at index {index} is invalid; retry with the next index")]
    InvalidChild { index: u32 },

    #[error("Invalid master key derived from seed")]
    InvalidMaster,

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Checksum mismatch")]
    BadChecksum,
}

impl KeyError {
    /// Whether the caller can recover by moving to the next child index.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InvalidChild { .. })
    }
}

/// Wallet record errors.
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("QR payload is not a viewing key export: {0}")]
    NotAnExport(String),

    #[error("Export for {0:?} carries no viewing key")]
    NoViewingKey(ChainFamily),

    #[error("Wallet already holds {0:?} keys")]
    FamilyExists(ChainFamily),

    #[error("Export is for account {found}, wallet is account {expected}")]
    AccountMismatch { expected: u32, found: u32 },

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error(transparent)]
    Qr(#[from] QrError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Pending transaction lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Signature exchange cancelled")]
    Cancelled,

    #[error("Signature does not match the request: {0}")]
    SignatureMismatch(String),
}

/// Network adapter errors.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Adapter for {0} is not ready; call initialize() first")]
    NotReady(String),

    #[error("No backend configured for {0}")]
    BackendMissing(String),

    #[error("Wallet {wallet} has no viewing key for {network}")]
    MissingViewingKey { wallet: String, network: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("QR error: {0}")]
    Qr(#[from] QrError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Light client error: {0}")]
    LightClient(#[from] LightClientError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Light client and chain spec errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LightClientError {
    #[error("Light client for {chain} is not ready (state: {state})")]
    NotReady { chain: String, state: String },

    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    #[error("Chain spec not found for {0}")]
    SpecNotFound(String),

    #[error("Invalid chain spec: {0}")]
    InvalidSpec(String),

    #[error("Relay chain {relay} for {chain} failed to connect: {reason}")]
    RelayUnavailable {
        chain: String,
        relay: String,
        reason: String,
    },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("RPC request {method} failed: {reason}")]
    Rpc { method: String, reason: String },

    #[error("Unexpected RPC response: {0}")]
    InvalidResponse(String),
}

/// Merkleized metadata errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Metadata decode failed: {0}")]
    Decode(String),

    #[error("Unsupported metadata version V{0}")]
    UnsupportedVersion(u32),

    #[error("Merkleization failed: {0}")]
    Merkleize(String),

    #[error("Proof verification failed: {0}")]
    InvalidProof(String),

    #[error("Stale metadata: cached spec version {cached}, runtime reports {current}")]
    Stale { cached: u32, current: u32 },
}

/// Crate-level error for operations crossing module boundaries.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Qr(#[from] QrError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    LightClient(#[from] LightClientError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}
