//! Named 0G storage network definitions.

use core::fmt;
use zgs_contracts::{Flow, testnet};

/// A named 0G storage network, keyed by its EVM chain id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[derive(strum::IntoStaticStr)]
#[derive(strum::EnumString)]
#[derive(strum::EnumIter)]
#[derive(num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u64)]
#[non_exhaustive]
pub enum NamedNetwork {
    /// Galileo testnet (chain id 16602).
    #[strum(to_string = "galileo", serialize = "testnet")]
    #[cfg_attr(feature = "serde", serde(rename = "galileo", alias = "testnet"))]
    Testnet = 16602,

    /// 0G mainnet (chain id 16661).
    #[strum(to_string = "mainnet")]
    Mainnet = 16661,
}

impl From<NamedNetwork> for u64 {
    #[inline]
    fn from(network: NamedNetwork) -> Self {
        network.chain_id()
    }
}

impl fmt::Display for NamedNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NamedNetwork {
    /// Canonical lowercase name, as accepted by `FromStr`.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Returns the EVM chain id.
    #[inline]
    pub const fn chain_id(&self) -> u64 {
        *self as u64
    }

    /// EVM JSON-RPC endpoint used for flow submissions.
    pub const fn rpc_url(&self) -> &'static str {
        match self {
            Self::Testnet => "https://evmrpc-testnet.0g.ai",
            Self::Mainnet => "https://evmrpc.0g.ai",
        }
    }

    /// Storage indexer used for node discovery and file lookups.
    pub const fn indexer_url(&self) -> &'static str {
        match self {
            Self::Testnet => "https://indexer-storage-testnet-turbo.0g.ai",
            Self::Mainnet => "https://indexer-storage-turbo.0g.ai",
        }
    }

    /// Block explorer, for linking submission transactions.
    pub const fn explorer_url(&self) -> &'static str {
        match self {
            Self::Testnet => "https://chainscan-galileo.0g.ai",
            Self::Mainnet => "https://chainscan.0g.ai",
        }
    }

    /// Flow contract deployment, if published.
    pub const fn flow(&self) -> Option<Flow> {
        match self {
            Self::Testnet => Some(testnet::FLOW),
            Self::Mainnet => None,
        }
    }
}
