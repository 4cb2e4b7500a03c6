// src/protocol.rs - Network protocol settings captured from the connected node
use serde::Deserialize;

/// Chain parameters required for transaction hashing and address rendering.
///
/// The values are copied from the node's `getversion` reply on first use so
/// the same binary can be pointed at mainnet, testnet or a private net
/// without rebuild.
#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    pub network_magic: u32,
    pub address_version: u8,
    pub ms_per_block: u32,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            network_magic: 860833102, // N3 mainnet
            address_version: 0x35,
            ms_per_block: 15_000,
        }
    }
}

/// Subset of the `getversion` RPC reply we care about.
#[derive(Debug, Deserialize)]
pub struct VersionReply {
    pub protocol: VersionProtocol,
}

#[derive(Debug, Deserialize)]
pub struct VersionProtocol {
    pub network: u32,
    #[serde(default = "default_address_version")]
    pub addressversion: u8,
    #[serde(default = "default_ms_per_block")]
    pub msperblock: u32,
}

fn default_address_version() -> u8 {
    0x35
}

fn default_ms_per_block() -> u32 {
    15_000
}

impl From<VersionReply> for ProtocolSettings {
    fn from(reply: VersionReply) -> Self {
        Self {
            network_magic: reply.protocol.network,
            address_version: reply.protocol.addressversion,
            ms_per_block: reply.protocol.msperblock,
        }
    }
}
