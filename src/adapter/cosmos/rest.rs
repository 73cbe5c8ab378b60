/// Cosmos LCD (REST) client
///
/// Numbers in LCD responses are decimal strings; everything is read through
/// `serde_json::Value` so vesting accounts and older SDK response shapes
/// degrade to "field missing" instead of a deserialization failure.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};

use super::{CosmosAccount, CosmosRpc};
use crate::adapter::{TransactionSummary, TransferDirection};
use crate::error::AdapterError;

pub struct RestCosmosClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestCosmosClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, AdapterError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AdapterError::Network(format!("{} returned {}: {}", path, status, body)));
        }
        Ok(response.json().await?)
    }

    async fn search_txs(
        &self,
        query: String,
        limit: usize,
    ) -> Result<Vec<Value>, AdapterError> {
        let body = self
            .get_json(
                "/cosmos/tx/v1beta1/txs",
                &[
                    ("query", query),
                    ("limit", limit.to_string()),
                    ("order_by", "ORDER_BY_DESC".to_string()),
                ],
            )
            .await?;
        Ok(body["tx_responses"].as_array().cloned().unwrap_or_default())
    }
}

fn parse_u64(value: &Value) -> Option<u64> {
    value.as_str()?.parse().ok()
}

fn parse_u128(value: &Value) -> Option<u128> {
    value.as_str()?.parse().ok()
}

/// `account_number`/`sequence` from a base or vesting account.
fn account_fields(account: &Value) -> Option<CosmosAccount> {
    let base = if account.get("account_number").is_some() {
        account
    } else {
        &account["base_vesting_account"]["base_account"]
    };
    Some(CosmosAccount {
        account_number: parse_u64(&base["account_number"])?,
        sequence: parse_u64(&base["sequence"]).unwrap_or(0),
    })
}

fn coin_amount(coins: &Value, denom: &str) -> Option<u128> {
    coins
        .as_array()?
        .iter()
        .filter(|c| c["denom"].as_str() == Some(denom))
        .filter_map(|c| parse_u128(&c["amount"]))
        .reduce(|a, b| a.saturating_add(b))
}

/// Summarize a tx response from `address`'s point of view. Only bank sends
/// in `denom` are counted toward the amount.
pub(crate) fn summarize_tx(tx: &Value, address: &str, denom: &str) -> Option<TransactionSummary> {
    let hash = tx["txhash"].as_str()?.to_string();
    let body = &tx["tx"]["body"];
    let mut incoming = 0u128;
    let mut outgoing = 0u128;
    let mut counterparty = None;
    for msg in body["messages"].as_array().into_iter().flatten() {
        if msg["@type"].as_str() != Some(super::proto::MSG_SEND_TYPE_URL) {
            continue;
        }
        let from = msg["from_address"].as_str().unwrap_or_default();
        let to = msg["to_address"].as_str().unwrap_or_default();
        let amount = coin_amount(&msg["amount"], denom).unwrap_or(0);
        if from == address {
            outgoing = outgoing.saturating_add(amount);
            counterparty.get_or_insert_with(|| to.to_string());
        }
        if to == address {
            incoming = incoming.saturating_add(amount);
            counterparty.get_or_insert_with(|| from.to_string());
        }
    }
    let direction = match (incoming > 0, outgoing > 0) {
        (true, true) => TransferDirection::SelfTransfer,
        (true, false) => TransferDirection::Incoming,
        _ => TransferDirection::Outgoing,
    };
    let timestamp = tx["timestamp"]
        .as_str()
        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.timestamp());
    let memo = body["memo"].as_str().filter(|m| !m.is_empty()).map(str::to_string);

    Some(TransactionSummary {
        hash,
        height: parse_u64(&tx["height"]),
        timestamp,
        direction,
        amount: incoming.max(outgoing),
        fee: coin_amount(&tx["tx"]["auth_info"]["fee"]["amount"], denom),
        counterparty,
        memo,
    })
}

#[async_trait]
impl CosmosRpc for RestCosmosClient {
    async fn account(&self, address: &str) -> Result<CosmosAccount, AdapterError> {
        let body = self
            .get_json(&format!("/cosmos/auth/v1beta1/accounts/{}", address), &[])
            .await?;
        account_fields(&body["account"]).ok_or_else(|| {
            AdapterError::Backend(format!("account {} has no account_number", address))
        })
    }

    async fn balance(&self, address: &str, denom: &str) -> Result<u128, AdapterError> {
        let body = self
            .get_json(
                &format!("/cosmos/bank/v1beta1/balances/{}/by_denom", address),
                &[("denom", denom.to_string())],
            )
            .await?;
        Ok(parse_u128(&body["balance"]["amount"]).unwrap_or(0))
    }

    async fn transactions(
        &self,
        address: &str,
        denom: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransactionSummary>, AdapterError> {
        let window = limit.saturating_add(offset);
        let sent = self
            .search_txs(format!("message.sender='{}'", address), window)
            .await?;
        let received = self
            .search_txs(format!("transfer.recipient='{}'", address), window)
            .await?;

        let mut summaries: Vec<TransactionSummary> = sent
            .iter()
            .chain(received.iter())
            .filter_map(|tx| summarize_tx(tx, address, denom))
            .collect();
        summaries.sort_by(|a, b| b.height.cmp(&a.height).then_with(|| a.hash.cmp(&b.hash)));
        summaries.dedup_by(|a, b| a.hash == b.hash);
        Ok(summaries.into_iter().skip(offset).take(limit).collect())
    }

    async fn latest_height(&self) -> Result<u64, AdapterError> {
        let body = self
            .get_json("/cosmos/base/tendermint/v1beta1/blocks/latest", &[])
            .await?;
        parse_u64(&body["block"]["header"]["height"])
            .ok_or_else(|| AdapterError::Backend("latest block has no height".into()))
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<String, AdapterError> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.base_url);
        log::debug!("Broadcasting {} byte transaction to {}", tx_bytes.len(), url);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "tx_bytes": BASE64.encode(tx_bytes),
                "mode": "BROADCAST_MODE_SYNC",
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AdapterError::Network(format!("Broadcast failed: {}", error_text)));
        }

        let body: Value = response.json().await?;
        let result = &body["tx_response"];
        let code = result["code"].as_u64().unwrap_or(0);
        if code != 0 {
            return Err(AdapterError::Backend(format!(
                "transaction rejected (code {}): {}",
                code,
                result["raw_log"].as_str().unwrap_or_default()
            )));
        }
        result["txhash"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AdapterError::Backend("broadcast response has no txhash".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_fields_base_and_vesting() {
        let base = json!({"account_number": "12", "sequence": "3"});
        assert_eq!(
            account_fields(&base),
            Some(CosmosAccount {
                account_number: 12,
                sequence: 3
            })
        );
        let vesting = json!({
            "base_vesting_account": {"base_account": {"account_number": "9", "sequence": "1"}}
        });
        assert_eq!(account_fields(&vesting).unwrap().account_number, 9);
        assert_eq!(account_fields(&json!({})), None);
    }

    #[test]
    fn test_summarize_incoming_send() {
        let tx = json!({
            "txhash": "ABC",
            "height": "100",
            "timestamp": "2024-05-01T12:00:00Z",
            "tx": {
                "body": {
                    "messages": [{
                        "@type": "/cosmos.bank.v1beta1.MsgSend",
                        "from_address": "cosmos1alice",
                        "to_address": "cosmos1me",
                        "amount": [{"denom": "uatom", "amount": "2500"}]
                    }],
                    "memo": ""
                },
                "auth_info": {"fee": {"amount": [{"denom": "uatom", "amount": "500"}]}}
            }
        });
        let summary = summarize_tx(&tx, "cosmos1me", "uatom").unwrap();
        assert_eq!(summary.direction, TransferDirection::Incoming);
        assert_eq!(summary.amount, 2500);
        assert_eq!(summary.height, Some(100));
        assert_eq!(summary.fee, Some(500));
        assert_eq!(summary.counterparty.as_deref(), Some("cosmos1alice"));
        assert_eq!(summary.memo, None);
        assert_eq!(summary.timestamp, Some(1_714_564_800));
    }
}
