/// Signature exchange with the air-gapped device
///
/// The host feeds scanned QR hex strings into a [`SessionHandle`]; the
/// session waits until a signature response answering the pending request
/// arrives or the user closes the scanner. Closing never leaves the
/// transaction in limbo: it either stays resumable in `AwaitingSignature` or
/// is marked `Failed`, per [`CancelPolicy`].

use tokio::sync::{mpsc, watch};

use super::transaction::{PendingTransaction, TxStatus};
use crate::error::TransactionError;
use crate::qr::{self, MessageKind, QrMessage};

/// What to do with the pending transaction when the exchange is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Keep `AwaitingSignature` so the user can scan again later.
    Resume,
    /// Mark the transaction `Failed`.
    Abandon,
}

/// Host side of a session: scanner input plus the cancel switch.
#[derive(Clone)]
pub struct SessionHandle {
    scans: mpsc::Sender<String>,
    cancel: watch::Sender<bool>,
}

impl SessionHandle {
    /// Deliver a scanned QR payload. Returns false once the session is gone.
    pub async fn submit_scan(&self, hex: impl Into<String>) -> bool {
        self.scans.send(hex.into()).await.is_ok()
    }

    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

pub struct SignatureSession {
    scans: mpsc::Receiver<String>,
    cancel: watch::Receiver<bool>,
}

impl SignatureSession {
    pub fn new() -> (Self, SessionHandle) {
        let (scan_tx, scan_rx) = mpsc::channel(8);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                scans: scan_rx,
                cancel: cancel_rx,
            },
            SessionHandle {
                scans: scan_tx,
                cancel: cancel_tx,
            },
        )
    }

    /// Wait for the device's signatures for `pending`.
    ///
    /// Scans that are not a matching signature response are logged and
    /// skipped. On success the transaction moves to `Signed` and the raw
    /// signature hex is returned.
    pub async fn wait(
        mut self,
        pending: &mut PendingTransaction,
        policy: CancelPolicy,
    ) -> Result<String, TransactionError> {
        if pending.status != TxStatus::AwaitingSignature {
            return Err(TransactionError::InvalidTransition {
                from: pending.status.to_string(),
                to: TxStatus::Signed.to_string(),
            });
        }
        let request = qr::decode_qr_hex(&pending.sign_request_hex)
            .map_err(|e| TransactionError::SignatureMismatch(format!("bad sign request: {}", e)))?;

        let mut cancel_live = true;
        loop {
            tokio::select! {
                scan = self.scans.recv() => {
                    let Some(hex) = scan else {
                        log::info!("Scanner closed for transaction {}", pending.id);
                        return Self::cancelled(pending, policy);
                    };
                    match check_response(&request, &hex) {
                        Ok(()) => {
                            pending.attach_signature(hex.clone())?;
                            log::info!("Received signatures for transaction {}", pending.id);
                            return Ok(hex);
                        }
                        Err(reason) => {
                            log::warn!("Ignoring scanned QR for {}: {}", pending.id, reason);
                        }
                    }
                }
                changed = self.cancel.changed(), if cancel_live => {
                    match changed {
                        Ok(()) if *self.cancel.borrow() => {
                            log::info!("Signature exchange cancelled for transaction {}", pending.id);
                            return Self::cancelled(pending, policy);
                        }
                        Ok(()) => {}
                        // handle dropped; closing the scan channel ends the wait
                        Err(_) => cancel_live = false,
                    }
                }
            }
        }
    }

    fn cancelled(
        pending: &mut PendingTransaction,
        policy: CancelPolicy,
    ) -> Result<String, TransactionError> {
        if policy == CancelPolicy::Abandon {
            pending.fail("signature exchange cancelled")?;
        }
        Err(TransactionError::Cancelled)
    }
}

/// A response must be a signatures message of the request's family that
/// answers the same digest.
pub fn check_response(request: &QrMessage, response_hex: &str) -> Result<(), TransactionError> {
    let response =
        qr::decode_qr_hex(response_hex).map_err(|e| TransactionError::SignatureMismatch(e.to_string()))?;
    if response.kind() != MessageKind::Signatures {
        return Err(TransactionError::SignatureMismatch(format!(
            "expected signatures, scanned {:?}",
            response.kind()
        )));
    }
    if response.family() != request.family() {
        return Err(TransactionError::SignatureMismatch(format!(
            "signatures are for {}, request is {}",
            response.family().name(),
            request.family().name()
        )));
    }
    if response.digest() != request.digest() {
        return Err(TransactionError::SignatureMismatch(
            "signatures answer a different digest".into(),
        ));
    }
    Ok(())
}
