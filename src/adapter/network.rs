/// Known networks and their chain parameters

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::keys::path;
use crate::qr::ChainFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkId {
    Penumbra,
    Zcash,
    Polkadot,
    Kusama,
    AssetHubPolkadot,
    CosmosHub,
    Osmosis,
    Noble,
    Celestia,
}

impl NetworkId {
    pub const ALL: [NetworkId; 9] = [
        Self::Penumbra,
        Self::Zcash,
        Self::Polkadot,
        Self::Kusama,
        Self::AssetHubPolkadot,
        Self::CosmosHub,
        Self::Osmosis,
        Self::Noble,
        Self::Celestia,
    ];

    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Penumbra => ChainFamily::Penumbra,
            Self::Zcash => ChainFamily::Zcash,
            Self::Polkadot | Self::Kusama | Self::AssetHubPolkadot => ChainFamily::Substrate,
            Self::CosmosHub | Self::Osmosis | Self::Noble | Self::Celestia => ChainFamily::Cosmos,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Penumbra => "penumbra",
            Self::Zcash => "zcash",
            Self::Polkadot => "polkadot",
            Self::Kusama => "kusama",
            Self::AssetHubPolkadot => "asset-hub-polkadot",
            Self::CosmosHub => "cosmoshub",
            Self::Osmosis => "osmosis",
            Self::Noble => "noble",
            Self::Celestia => "celestia",
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Self::Penumbra => 6,
            Self::Zcash => 8,
            Self::Polkadot | Self::AssetHubPolkadot => 10,
            Self::Kusama => 12,
            Self::CosmosHub | Self::Osmosis | Self::Noble | Self::Celestia => 6,
        }
    }

    /// Display denomination.
    pub fn denom(&self) -> &'static str {
        match self {
            Self::Penumbra => "UM",
            Self::Zcash => "ZEC",
            Self::Polkadot | Self::AssetHubPolkadot => "DOT",
            Self::Kusama => "KSM",
            Self::CosmosHub => "ATOM",
            Self::Osmosis => "OSMO",
            Self::Noble => "USDC",
            Self::Celestia => "TIA",
        }
    }

    /// On-chain base denomination for cosmos bank queries.
    pub fn base_denom(&self) -> Option<&'static str> {
        match self {
            Self::CosmosHub => Some("uatom"),
            Self::Osmosis => Some("uosmo"),
            Self::Noble => Some("uusdc"),
            Self::Celestia => Some("utia"),
            _ => None,
        }
    }

    pub fn bech32_hrp(&self) -> Option<&'static str> {
        match self {
            Self::CosmosHub => Some("cosmos"),
            Self::Osmosis => Some("osmo"),
            Self::Noble => Some("noble"),
            Self::Celestia => Some("celestia"),
            _ => None,
        }
    }

    /// Cosmos chain id used in the sign doc.
    pub fn cosmos_chain_id(&self) -> Option<&'static str> {
        match self {
            Self::CosmosHub => Some("cosmoshub-4"),
            Self::Osmosis => Some("osmosis-1"),
            Self::Noble => Some("noble-1"),
            Self::Celestia => Some("celestia"),
            _ => None,
        }
    }

    pub fn ss58_prefix(&self) -> Option<u16> {
        match self {
            Self::Polkadot | Self::AssetHubPolkadot => Some(0),
            Self::Kusama => Some(2),
            _ => None,
        }
    }

    /// Relay chain a parachain anchors to.
    pub fn relay(&self) -> Option<NetworkId> {
        match self {
            Self::AssetHubPolkadot => Some(Self::Polkadot),
            _ => None,
        }
    }

    /// Chains served under a relay (the relay itself first).
    pub fn chains_under(relay: NetworkId) -> Vec<NetworkId> {
        Self::ALL
            .into_iter()
            .filter(|n| *n == relay || n.relay() == Some(relay))
            .collect()
    }

    pub fn coin_type(&self) -> u32 {
        match self {
            Self::Penumbra => path::COIN_PENUMBRA,
            Self::Zcash => path::COIN_ZCASH,
            Self::Polkadot | Self::AssetHubPolkadot => path::COIN_POLKADOT,
            Self::Kusama => path::COIN_KUSAMA,
            Self::CosmosHub | Self::Osmosis | Self::Noble | Self::Celestia => path::COIN_COSMOS,
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkId {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|n| n.as_str() == wanted)
            .ok_or_else(|| AdapterError::Backend(format!("unknown network {:?}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for network in NetworkId::ALL {
            assert_eq!(network.as_str().parse::<NetworkId>().unwrap(), network);
        }
        assert!("ethereum".parse::<NetworkId>().is_err());
    }

    #[test]
    fn test_parameters_per_family() {
        for network in NetworkId::ALL {
            match network.family() {
                ChainFamily::Cosmos => {
                    assert!(network.bech32_hrp().is_some());
                    assert!(network.base_denom().is_some());
                }
                ChainFamily::Substrate => assert!(network.ss58_prefix().is_some()),
                _ => assert!(network.ss58_prefix().is_none()),
            }
        }
    }

    #[test]
    fn test_chains_under_relay() {
        assert_eq!(
            NetworkId::chains_under(NetworkId::Polkadot),
            vec![NetworkId::Polkadot, NetworkId::AssetHubPolkadot]
        );
        assert_eq!(NetworkId::chains_under(NetworkId::Kusama), vec![NetworkId::Kusama]);
    }
}
