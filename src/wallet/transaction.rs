use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::NetworkId;
use crate::error::TransactionError;

/// Status of an outgoing transaction. Ordered: every transition moves right,
/// except `Failed`, reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Building,
    AwaitingSignature,
    Signed,
    Broadcasting,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::AwaitingSignature => "awaiting_signature",
            Self::Signed => "signed",
            Self::Broadcasting => "broadcasting",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: String,
    pub network: NetworkId,
    pub wallet_id: String,
    pub summary: String,
    pub sign_request_hex: String,
    pub status: TxStatus,
    pub created_at: DateTime<Utc>,
    pub signature_hex: Option<String>,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    /// Adapter-specific data needed to assemble the signed transaction.
    #[serde(default)]
    pub build_context: serde_json::Value,
}

impl PendingTransaction {
    pub fn new(network: NetworkId, wallet_id: &str, summary: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            network,
            wallet_id: wallet_id.to_string(),
            summary: summary.into(),
            sign_request_hex: String::new(),
            status: TxStatus::Building,
            created_at: Utc::now(),
            signature_hex: None,
            tx_hash: None,
            error: None,
            build_context: serde_json::Value::Null,
        }
    }

    fn transition(&mut self, next: TxStatus) -> Result<(), TransactionError> {
        let allowed = match next {
            TxStatus::Failed => !self.status.is_terminal(),
            _ => next > self.status && !self.status.is_terminal(),
        };
        if !allowed {
            return Err(TransactionError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        log::debug!("Transaction {}: {} -> {}", self.id, self.status, next);
        self.status = next;
        Ok(())
    }

    /// Attach the encoded sign request and wait for the device.
    pub fn await_signature(&mut self, sign_request_hex: String) -> Result<(), TransactionError> {
        self.transition(TxStatus::AwaitingSignature)?;
        self.sign_request_hex = sign_request_hex;
        Ok(())
    }

    pub fn attach_signature(&mut self, signature_hex: String) -> Result<(), TransactionError> {
        self.transition(TxStatus::Signed)?;
        self.signature_hex = Some(signature_hex);
        Ok(())
    }

    pub fn mark_broadcasting(&mut self) -> Result<(), TransactionError> {
        self.transition(TxStatus::Broadcasting)
    }

    pub fn confirm(&mut self, tx_hash: String) -> Result<(), TransactionError> {
        self.transition(TxStatus::Confirmed)?;
        self.tx_hash = Some(tx_hash);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TransactionError> {
        self.transition(TxStatus::Failed)?;
        let reason = reason.into();
        log::warn!("Transaction {} failed: {}", self.id, reason);
        self.error = Some(reason);
        Ok(())
    }
}
