// src/wallet.rs - Neo N3 key pairs, WIF encoding and address derivation
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::ChainError;

/// PUSHDATA1 opcode used in single-sig verification scripts.
const OP_PUSHDATA1: u8 = 0x0C;
/// SYSCALL opcode.
const OP_SYSCALL: u8 = 0x41;
/// Interop hash of System.Crypto.CheckSig.
const CHECKSIG_INTEROP: [u8; 4] = [0x56, 0xe7, 0xb3, 0x27];

/// WIF payload prefix (shared with the Bitcoin encoding Neo inherited).
const WIF_PREFIX: u8 = 0x80;
/// WIF compressed-key suffix.
const WIF_COMPRESSED: u8 = 0x01;

/// A 20-byte contract or account hash in its serialized (little-endian) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptHash(pub [u8; 20]);

impl ScriptHash {
    /// Hash a verification or contract script: RIPEMD160(SHA256(script)).
    pub fn from_script(script: &[u8]) -> Self {
        let sha = Sha256::digest(script);
        let ripe = Ripemd160::digest(sha);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&ripe);
        Self(bytes)
    }

    /// Parse the big-endian display form, e.g.
    /// `0xd2a4cff31913016155e38e474a2c06d08be276cf`.
    pub fn from_hex_be(value: &str) -> Result<Self, ChainError> {
        let trimmed = value.trim().trim_start_matches("0x");
        let raw = hex::decode(trimmed)
            .map_err(|e| ChainError::InvalidScriptHash(format!("{value}: {e}")))?;
        if raw.len() != 20 {
            return Err(ChainError::InvalidScriptHash(format!(
                "expected 20 bytes, got {}",
                raw.len()
            )));
        }
        let mut bytes = [0u8; 20];
        for (i, b) in raw.iter().rev().enumerate() {
            bytes[i] = *b;
        }
        Ok(Self(bytes))
    }

    /// Big-endian display form with `0x` prefix.
    pub fn to_hex_be(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        format!("0x{}", hex::encode(reversed))
    }

    /// Render as a Neo address under the given address version.
    pub fn to_address(&self, address_version: u8) -> String {
        let mut payload = Vec::with_capacity(21);
        payload.push(address_version);
        payload.extend_from_slice(&self.0);
        base58check_encode(&payload)
    }

    /// Parse a Neo address back into its script hash, validating the
    /// checksum and version byte.
    pub fn from_address(address: &str, address_version: u8) -> Result<Self, ChainError> {
        let payload = base58check_decode(address)
            .map_err(|e| ChainError::InvalidAddress(format!("{address}: {e}")))?;
        if payload.len() != 21 {
            return Err(ChainError::InvalidAddress(format!(
                "{address}: expected 21-byte payload, got {}",
                payload.len()
            )));
        }
        if payload[0] != address_version {
            return Err(ChainError::InvalidAddress(format!(
                "{address}: version byte {:#04x} does not match network {:#04x}",
                payload[0], address_version
            )));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&payload[1..]);
        Ok(Self(bytes))
    }
}

/// A secp256r1 key pair used for transaction witnesses.
///
/// Loaded once at process start and held immutable; the private scalar never
/// leaves this type except through [`KeyPair::to_wif`].
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Construct from a raw 32-byte private key.
    pub fn from_private_key(bytes: &[u8]) -> Result<Self, ChainError> {
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| ChainError::InvalidKey(format!("private key rejected: {e}")))?;
        let verifying_key = *signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Decode a WIF-encoded private key.
    pub fn from_wif(wif: &str) -> Result<Self, ChainError> {
        let payload = base58check_decode(wif.trim())
            .map_err(|e| ChainError::InvalidKey(format!("WIF decode failed: {e}")))?;
        if payload.len() != 34 || payload[0] != WIF_PREFIX || payload[33] != WIF_COMPRESSED {
            return Err(ChainError::InvalidKey(
                "WIF payload must be 0x80 || key || 0x01".into(),
            ));
        }
        Self::from_private_key(&payload[1..33])
    }

    /// Encode the private key as WIF. Callers must keep the result out of
    /// logs and error messages.
    pub fn to_wif(&self) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(WIF_PREFIX);
        payload.extend_from_slice(&self.signing_key.to_bytes());
        payload.push(WIF_COMPRESSED);
        base58check_encode(&payload)
    }

    /// Compressed SEC1 public key (33 bytes).
    pub fn public_key(&self) -> Vec<u8> {
        self.verifying_key
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Single-signature verification script:
    /// `PUSHDATA1 33 <pubkey> SYSCALL System.Crypto.CheckSig`.
    pub fn verification_script(&self) -> Vec<u8> {
        let pubkey = self.public_key();
        let mut script = Vec::with_capacity(2 + pubkey.len() + 5);
        script.push(OP_PUSHDATA1);
        script.push(pubkey.len() as u8);
        script.extend_from_slice(&pubkey);
        script.push(OP_SYSCALL);
        script.extend_from_slice(&CHECKSIG_INTEROP);
        script
    }

    /// Script hash of the account's verification script.
    pub fn script_hash(&self) -> ScriptHash {
        ScriptHash::from_script(&self.verification_script())
    }

    /// Neo address of this account under the given address version.
    pub fn address(&self, address_version: u8) -> String {
        self.script_hash().to_address(address_version)
    }

    /// Produce a 64-byte r||s signature over `message`.
    ///
    /// Neo witnesses sign SHA-256 of the sign data, so the digest is taken
    /// here and signed as a prehash.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; 64], ChainError> {
        let digest = Sha256::digest(message);
        let signature: Signature = self
            .signing_key
            .sign_prehash(&digest)
            .map_err(|e| ChainError::InvalidKey(format!("signing failed: {e}")))?;
        let signature = signature.normalize_s().unwrap_or(signature);
        let mut out = [0u8; 64];
        out.copy_from_slice(&signature.to_bytes());
        Ok(out)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never leak the private scalar through Debug output.
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

/// Base58 with a double-SHA256 4-byte checksum suffix.
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = Sha256::digest(Sha256::digest(payload));
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// Decode base58check, verifying the checksum.
pub fn base58check_decode(encoded: &str) -> Result<Vec<u8>, String> {
    let data = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| format!("invalid base58: {e}"))?;
    if data.len() < 5 {
        return Err("payload too short".into());
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    let expected = Sha256::digest(Sha256::digest(payload));
    if checksum != &expected[..4] {
        return Err("checksum mismatch".into());
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wif_round_trip() {
        let pair = KeyPair::generate();
        let wif = pair.to_wif();
        let restored = KeyPair::from_wif(&wif).expect("WIF should decode");
        assert_eq!(pair.public_key(), restored.public_key());
        assert_eq!(restored.to_wif(), wif);
    }

    #[test]
    fn wif_rejects_corrupted_checksum() {
        let pair = KeyPair::generate();
        let mut wif = pair.to_wif();
        // Flip the final character to break the checksum.
        let last = wif.pop().unwrap();
        let replacement = if last == '1' { '2' } else { '1' };
        wif.push(replacement);
        assert!(KeyPair::from_wif(&wif).is_err());
    }

    #[test]
    fn address_round_trip() {
        let pair = KeyPair::generate();
        let address = pair.address(0x35);
        assert!(address.starts_with('N'));
        let hash = ScriptHash::from_address(&address, 0x35).expect("address should parse");
        assert_eq!(hash, pair.script_hash());
    }

    #[test]
    fn address_rejects_wrong_version() {
        let pair = KeyPair::generate();
        let address = pair.address(0x35);
        assert!(ScriptHash::from_address(&address, 0x17).is_err());
    }

    #[test]
    fn verification_script_shape() {
        let pair = KeyPair::generate();
        let script = pair.verification_script();
        assert_eq!(script.len(), 40);
        assert_eq!(script[0], OP_PUSHDATA1);
        assert_eq!(script[1], 33);
        assert_eq!(script[35], OP_SYSCALL);
        assert_eq!(&script[36..], &CHECKSIG_INTEROP);
    }

    #[test]
    fn script_hash_hex_round_trip() {
        let hash = ScriptHash::from_hex_be("0xd2a4cff31913016155e38e474a2c06d08be276cf")
            .expect("well-formed hash");
        assert_eq!(
            hash.to_hex_be(),
            "0xd2a4cff31913016155e38e474a2c06d08be276cf"
        );
    }

    #[test]
    fn signature_is_64_bytes_and_deterministic_per_message() {
        let pair = KeyPair::generate();
        let sig1 = pair.sign(b"neofeed").unwrap();
        let sig2 = pair.sign(b"neofeed").unwrap();
        // RFC 6979 deterministic nonces: same key + message => same signature.
        assert_eq!(sig1, sig2);
        assert_ne!(sig1, pair.sign(b"other").unwrap());
    }
}
