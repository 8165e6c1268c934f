//! EIP-191 personal-sign helpers over secp256k1.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::ProviderError;
use crate::provider::Address;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash of `"\x19Ethereum Signed Message:\n" + len + message`.
pub fn eip191_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let prefix = format!("\x19Ethereum Signed Message:\n{}", bytes.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(bytes);
    hasher.finalize().into()
}

pub fn address_of(key: &VerifyingKey) -> Result<Address, ProviderError> {
    let encoded = key.to_encoded_point(false);
    let pubkey = encoded.as_bytes();
    if pubkey.len() != 65 || pubkey[0] != 0x04 {
        return Err(ProviderError::Other(
            "unexpected public key encoding".to_string(),
        ));
    }
    let digest = keccak256(&pubkey[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Ok(Address::from_bytes(&out))
}

/// Produce a 65-byte `r || s || v` signature (v = 27/28), hex encoded.
pub fn personal_sign(key: &SigningKey, message: &str) -> Result<String, ProviderError> {
    let prehash = eip191_hash(message);
    let (sig, recid) = key
        .sign_prehash_recoverable(&prehash)
        .map_err(|e| ProviderError::Other(format!("signing failed: {e}")))?;
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(recid.to_byte() + 27);
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Recover the signer address of a personal-sign signature.
pub fn recover_personal(message: &str, signature_hex: &str) -> Result<Address, ProviderError> {
    let raw = signature_hex.trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = hex::decode(raw)
        .map_err(|e| ProviderError::Other(format!("signature is not hex: {e}")))?;
    if bytes.len() != 65 {
        return Err(ProviderError::Other(
            "signature must decode to 65 bytes".to_string(),
        ));
    }

    let sig = Signature::from_slice(&bytes[..64])
        .map_err(|e| ProviderError::Other(format!("invalid ECDSA signature bytes: {e}")))?;
    let v = match bytes[64] {
        27 | 28 => bytes[64] - 27,
        0 | 1 => bytes[64],
        _ => {
            return Err(ProviderError::Other(
                "signature recovery id must be 0/1 or 27/28".to_string(),
            ));
        }
    };
    let recid = RecoveryId::try_from(v)
        .map_err(|_| ProviderError::Other("signature recovery id is invalid".to_string()))?;

    let key = VerifyingKey::recover_from_prehash(&eip191_hash(message), &sig, recid)
        .map_err(|e| ProviderError::Other(format!("failed recovering signer: {e}")))?;
    address_of(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARDHAT_KEY_0: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn key() -> SigningKey {
        SigningKey::from_slice(&hex::decode(HARDHAT_KEY_0).unwrap()).unwrap()
    }

    #[test]
    fn derives_known_hardhat_address() {
        let address = address_of(key().verifying_key()).unwrap();
        assert_eq!(
            address.as_str(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn signature_recovers_signer() {
        let key = key();
        let signature = personal_sign(&key, "Hello Fastcampus").unwrap();
        assert_eq!(signature.len(), 2 + 130);

        let recovered = recover_personal("Hello Fastcampus", &signature).unwrap();
        assert_eq!(recovered, address_of(key.verifying_key()).unwrap());

        let other = recover_personal("something else", &signature).unwrap();
        assert_ne!(other, recovered);
    }

    #[test]
    fn rejects_malformed_signatures() {
        assert!(recover_personal("m", "0xabc").is_err());
        assert!(recover_personal("m", &format!("0x{}", "zz".repeat(65))).is_err());
    }
}
