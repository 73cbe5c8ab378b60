use std::env;
use std::io::{self, Read};

use airgap_core::qr::MessageKind;
use airgap_core::{decode_qr_hex, detect_chain, detect_message_type, WalletRecord};
use anyhow::{bail, Context};

/// Decode a scanned QR payload and print it as JSON.
///
/// Usage: `qr-inspect <hex>` or `echo <hex> | qr-inspect`
fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let payload = match env::args().nth(1) {
        Some(arg) => arg,
        None => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read payload from stdin")?;
            input
        }
    };
    let payload = payload.trim();
    if payload.is_empty() {
        bail!("usage: qr-inspect <hex>");
    }

    let chain = detect_chain(payload);
    let kind = detect_message_type(payload);
    log::info!("Detected chain {:?}, message {:?}", chain, kind);

    let message = decode_qr_hex(payload).context("Failed to decode QR payload")?;
    println!("{}", serde_json::to_string_pretty(&message)?);

    if kind == Some(MessageKind::FvkExport) {
        let wallet = WalletRecord::from_export(&message).context("Failed to import export")?;
        println!("{}", serde_json::to_string_pretty(&wallet)?);
    }
    Ok(())
}
