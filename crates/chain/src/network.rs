use std::fmt;
use std::str::FromStr;

use crate::ChainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Base,
    BaseSepolia,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Base => 8453,
            Network::BaseSepolia => 84532,
        }
    }


    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        let host = match self {
            Network::Base => "https://basescan.org",
            Network::BaseSepolia => "https://sepolia.basescan.org",
        };
        format!("{}/tx/{}", host, tx_hash)
    }
}

impl FromStr for Network {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" | "8453" => Ok(Network::Base),
            "base-sepolia" | "base_sepolia" | "84532" => Ok(Network::BaseSepolia),
            other => Err(ChainError::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Base => write!(f, "base"),
            Network::BaseSepolia => write!(f, "base-sepolia"),
        }
    }
}
