/// Core configuration from environment variables
///
/// Controls balance cache timing, chain-spec sources, the zcash network and
/// cosmos REST endpoints. `Default` mirrors the values used when a variable
/// is unset.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapter::NetworkId;
use crate::balance::cache::{DEFAULT_BALANCE_TTL, DEFAULT_DORMANCY_THRESHOLD};
use crate::keys::NetworkKind;
use crate::qr::ChainFamily;

#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// How long a cached balance counts as fresh
    pub balance_ttl: Duration,
    /// Consecutive zero balances before a chain goes dormant
    pub dormancy_threshold: u32,
    /// Remote chain-spec directory (`{url}/{chain_id}.json`)
    pub chain_spec_base_url: Option<String>,
    /// Local directory of bundled `<chain_id>.json` specs
    pub chain_spec_dir: Option<PathBuf>,
    /// How long background balance fetches wait for a light client to sync
    pub light_client_ready_timeout: Duration,
    pub zcash_network: NetworkKind,
    /// Cosmos LCD endpoints per network
    pub cosmos_rest: HashMap<NetworkId, String>,
}

fn default_cosmos_rest(network: NetworkId) -> Option<&'static str> {
    match network {
        NetworkId::CosmosHub => Some("https://cosmos-rest.publicnode.com"),
        NetworkId::Osmosis => Some("https://osmosis-rest.publicnode.com"),
        NetworkId::Noble => Some("https://noble-rest.publicnode.com"),
        NetworkId::Celestia => Some("https://celestia-rest.publicnode.com"),
        _ => None,
    }
}

/// `COSMOS_REST_<NETWORK>`, e.g. `COSMOS_REST_COSMOSHUB`.
pub fn cosmos_rest_var(network: NetworkId) -> String {
    format!(
        "COSMOS_REST_{}",
        network.as_str().to_uppercase().replace('-', "_")
    )
}

impl Default for CoreConfig {
    fn default() -> Self {
        let cosmos_rest = NetworkId::ALL
            .into_iter()
            .filter_map(|n| default_cosmos_rest(n).map(|url| (n, url.to_string())))
            .collect();
        Self {
            balance_ttl: DEFAULT_BALANCE_TTL,
            dormancy_threshold: DEFAULT_DORMANCY_THRESHOLD,
            chain_spec_base_url: None,
            chain_spec_dir: None,
            light_client_ready_timeout: Duration::from_secs(30),
            zcash_network: NetworkKind::Main,
            cosmos_rest,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Ignoring invalid {}={:?}", name, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl CoreConfig {
    /// Load configuration from environment variables
    ///
    /// - `BALANCE_TTL_SECS` (default 60)
    /// - `DORMANCY_THRESHOLD` (default 3)
    /// - `CHAIN_SPEC_BASE_URL`, `CHAIN_SPEC_DIR` (optional)
    /// - `LIGHT_CLIENT_READY_SECS` (default 30)
    /// - `ZCASH_NETWORK`: "mainnet" (default) or "testnet"
    /// - `COSMOS_REST_<NETWORK>`: LCD endpoint override per cosmos network
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let balance_ttl = Duration::from_secs(parse_var(
            "BALANCE_TTL_SECS",
            defaults.balance_ttl.as_secs(),
        ));
        let dormancy_threshold = parse_var("DORMANCY_THRESHOLD", defaults.dormancy_threshold);
        let light_client_ready_timeout = Duration::from_secs(parse_var(
            "LIGHT_CLIENT_READY_SECS",
            defaults.light_client_ready_timeout.as_secs(),
        ));

        let zcash_network = match env::var("ZCASH_NETWORK") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("Unknown ZCASH_NETWORK '{}', defaulting to mainnet", raw);
                NetworkKind::Main
            }),
            Err(_) => defaults.zcash_network,
        };
        log::info!("Zcash network: {:?}", zcash_network);

        let chain_spec_base_url = env::var("CHAIN_SPEC_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());
        if let Some(url) = &chain_spec_base_url {
            log::info!("Remote chain specs from {}", url);
        }
        let chain_spec_dir = env::var("CHAIN_SPEC_DIR").ok().map(PathBuf::from);

        let mut cosmos_rest = defaults.cosmos_rest;
        for network in NetworkId::ALL
            .into_iter()
            .filter(|n| n.family() == ChainFamily::Cosmos)
        {
            if let Ok(url) = env::var(cosmos_rest_var(network)) {
                log::info!("{} REST endpoint: {}", network, url);
                cosmos_rest.insert(network, url);
            }
        }

        Self {
            balance_ttl,
            dormancy_threshold,
            chain_spec_base_url,
            chain_spec_dir,
            light_client_ready_timeout,
            zcash_network,
            cosmos_rest,
        }
    }

    pub fn cosmos_rest_url(&self, network: NetworkId) -> Option<String> {
        self.cosmos_rest.get(&network).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.balance_ttl.as_secs(), 60);
        assert_eq!(config.dormancy_threshold, 3);
        assert_eq!(config.zcash_network, NetworkKind::Main);
        assert!(config.cosmos_rest_url(NetworkId::Osmosis).is_some());
        assert!(config.cosmos_rest_url(NetworkId::Polkadot).is_none());
    }

    #[test]
    fn test_cosmos_rest_var_name() {
        assert_eq!(cosmos_rest_var(NetworkId::CosmosHub), "COSMOS_REST_COSMOSHUB");
    }
}
