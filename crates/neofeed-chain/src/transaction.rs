// src/transaction.rs - Neo N3 transaction building, hashing and witnessing
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::ChainError;
use crate::wallet::{KeyPair, ScriptHash};

const OP_PUSHDATA1: u8 = 0x0C;

/// Maximum blocks a transaction stays valid past the current height.
pub const DEFAULT_VALID_UNTIL_DELTA: u32 = 86;

// Witness scope bits (subset used by the oracle).
const SCOPE_CALLED_BY_ENTRY: u8 = 0x01;
const SCOPE_CUSTOM_CONTRACTS: u8 = 0x10;

/// A transaction signer: the account plus the witness scope it grants.
#[derive(Debug, Clone)]
pub struct Signer {
    pub account: ScriptHash,
    scope: u8,
    allowed_contracts: Vec<ScriptHash>,
}

impl Signer {
    /// Witness valid only for the entry script.
    pub fn called_by_entry(account: ScriptHash) -> Self {
        Self {
            account,
            scope: SCOPE_CALLED_BY_ENTRY,
            allowed_contracts: Vec::new(),
        }
    }

    /// Called-by-entry witness additionally restricted to a fixed contract
    /// set; used so the oracle keys cannot be replayed against other
    /// contracts.
    pub fn called_by_entry_restricted(account: ScriptHash, contracts: Vec<ScriptHash>) -> Self {
        Self {
            account,
            scope: SCOPE_CALLED_BY_ENTRY | SCOPE_CUSTOM_CONTRACTS,
            allowed_contracts: contracts,
        }
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.account.0);
        out.push(self.scope);
        if self.scope & SCOPE_CUSTOM_CONTRACTS != 0 {
            write_varint(out, self.allowed_contracts.len() as u64);
            for contract in &self.allowed_contracts {
                out.extend_from_slice(&contract.0);
            }
        }
    }
}

/// An attached witness: invocation script (signature push) plus the
/// account's verification script.
#[derive(Debug, Clone)]
pub struct Witness {
    pub invocation: Vec<u8>,
    pub verification: Vec<u8>,
}

impl Witness {
    fn from_signature(signature: [u8; 64], verification: Vec<u8>) -> Self {
        let mut invocation = Vec::with_capacity(66);
        invocation.push(OP_PUSHDATA1);
        invocation.push(64);
        invocation.extend_from_slice(&signature);
        Self {
            invocation,
            verification,
        }
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        write_var_bytes(out, &self.invocation);
        write_var_bytes(out, &self.verification);
    }
}

/// A Neo N3 transaction. Built unsigned, then witnessed via [`Transaction::sign`].
#[derive(Debug, Clone)]
pub struct Transaction {
    pub version: u8,
    pub nonce: u32,
    pub system_fee: i64,
    pub network_fee: i64,
    pub valid_until_block: u32,
    pub signers: Vec<Signer>,
    pub script: Vec<u8>,
    pub witnesses: Vec<Witness>,
}

impl Transaction {
    pub fn new(script: Vec<u8>, signers: Vec<Signer>, valid_until_block: u32) -> Self {
        Self {
            version: 0,
            nonce: rand::thread_rng().gen(),
            system_fee: 0,
            network_fee: 0,
            valid_until_block,
            signers,
            script,
            witnesses: Vec::new(),
        }
    }

    /// Serialize the unsigned portion (everything but the witnesses).
    pub fn serialize_unsigned(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.script.len());
        out.push(self.version);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&self.system_fee.to_le_bytes());
        out.extend_from_slice(&self.network_fee.to_le_bytes());
        out.extend_from_slice(&self.valid_until_block.to_le_bytes());
        write_varint(&mut out, self.signers.len() as u64);
        for signer in &self.signers {
            signer.serialize(&mut out);
        }
        // Attributes: none.
        write_varint(&mut out, 0);
        write_var_bytes(&mut out, &self.script);
        out
    }

    /// Full wire form including witnesses, as submitted to
    /// `sendrawtransaction`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.serialize_unsigned();
        write_varint(&mut out, self.witnesses.len() as u64);
        for witness in &self.witnesses {
            witness.serialize(&mut out);
        }
        out
    }

    /// Transaction hash: SHA-256 of the unsigned serialization.
    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(self.serialize_unsigned()).into()
    }

    /// Hash in the node's display order (`0x` + reversed hex), the form
    /// accepted by `getrawtransaction`.
    pub fn hash_hex(&self) -> String {
        let mut hash = self.hash();
        hash.reverse();
        format!("0x{}", hex::encode(hash))
    }

    /// Data each witness signs: network magic (LE) followed by the
    /// transaction hash.
    pub fn sign_data(&self, network_magic: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(36);
        data.extend_from_slice(&network_magic.to_le_bytes());
        data.extend_from_slice(&self.hash());
        data
    }

    /// Compute and attach one witness per signer, in signer order.
    ///
    /// Every signer must have a key pair whose verification-script hash
    /// matches its account; a signer without one is a [`ChainError::MissingKey`].
    pub fn sign(&mut self, network_magic: u32, keys: &[&KeyPair]) -> Result<(), ChainError> {
        let sign_data = self.sign_data(network_magic);
        let mut witnesses = Vec::with_capacity(self.signers.len());
        for signer in &self.signers {
            let key = keys
                .iter()
                .find(|k| k.script_hash() == signer.account)
                .ok_or_else(|| ChainError::MissingKey(signer.account.to_hex_be()))?;
            let signature = key.sign(&sign_data)?;
            witnesses.push(Witness::from_signature(signature, key.verification_script()));
        }
        self.witnesses = witnesses;
        Ok(())
    }

    /// Attach zero-signature witnesses so the node can size the network
    /// fee before the real signatures exist.
    pub fn attach_placeholder_witnesses(&mut self, keys: &[&KeyPair]) -> Result<(), ChainError> {
        let mut witnesses = Vec::with_capacity(self.signers.len());
        for signer in &self.signers {
            let key = keys
                .iter()
                .find(|k| k.script_hash() == signer.account)
                .ok_or_else(|| ChainError::MissingKey(signer.account.to_hex_be()))?;
            witnesses.push(Witness::from_signature([0u8; 64], key.verification_script()));
        }
        self.witnesses = witnesses;
        Ok(())
    }
}

/// Bitcoin-style variable-length integer.
pub fn write_varint(out: &mut Vec<u8>, value: u64) {
    if value < 0xFD {
        out.push(value as u8);
    } else if value <= 0xFFFF {
        out.push(0xFD);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xFFFF_FFFF {
        out.push(0xFE);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xFF);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

pub fn write_var_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_varint(out, data.len() as u64);
    out.extend_from_slice(data);
}
