use crate::error::{KdbxError, Result};
use crate::secret::Secret;
use aes::cipher::{
    block_padding::Pkcs7, generic_array::GenericArray, BlockDecryptMut, BlockEncrypt,
    BlockEncryptMut, KeyInit, KeyIvInit,
};
use aes::Aes256;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const AES_BLOCK_SIZE: usize = 16;

/// Apply the iterated key-stretching transform: encrypt `key` in place with
/// AES-256-ECB (no padding, no IV) under `seed`, re-encrypting the previous
/// round's output, for exactly `rounds` iterations. Zero rounds returns the
/// input unchanged.
///
/// The loop runs in constant structure regardless of input values; its cost
/// is the security property. Operates on raw bytes only, never through a
/// text encoding.
pub fn transform_key(key: &[u8], seed: &[u8], rounds: u64) -> Result<Vec<u8>> {
    if key.is_empty() || key.len() % AES_BLOCK_SIZE != 0 {
        return Err(KdbxError::InvalidParameter(format!(
            "Transform input must be a multiple of {} bytes, got {}",
            AES_BLOCK_SIZE,
            key.len()
        )));
    }
    let cipher = Aes256::new_from_slice(seed).map_err(|_| {
        KdbxError::InvalidParameter(format!(
            "Transform seed must be 32 bytes, got {}",
            seed.len()
        ))
    })?;

    let mut transformed = key.to_vec();
    for _ in 0..rounds {
        for block in transformed.chunks_exact_mut(AES_BLOCK_SIZE) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
    }
    Ok(transformed)
}

/// Derive the 32-byte master key:
/// `SHA-256(masterSeed || SHA-256(transform_key(compositeHash, transformSeed, rounds)))`
///
/// Recomputed per load/save call; never cached across calls.
pub fn build_master_key(
    composite_hash: &Secret,
    master_seed: &[u8],
    transform_seed: &[u8],
    rounds: u64,
) -> Result<Secret> {
    let mut transformed =
        composite_hash.expose(|hash| transform_key(hash, transform_seed, rounds))?;
    let transformed_hash = Sha256::digest(&transformed);
    transformed.zeroize();

    let mut hasher = Sha256::new();
    hasher.update(master_seed);
    hasher.update(transformed_hash);
    Ok(Secret::from_slice(&hasher.finalize()))
}

/// Encrypt the payload region with AES-256-CBC and PKCS#7 padding
pub fn encrypt_payload(master_key: &Secret, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = master_key.expose(|key| {
        Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|err| KdbxError::Crypto(format!("Invalid cipher key or IV: {}", err)))
    })?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt the payload region with AES-256-CBC and PKCS#7 padding.
///
/// A padding failure is reported as an integrity error: it is ambiguous
/// between wrong credentials and corruption, and the two are deliberately
/// not distinguished.
pub fn decrypt_payload(master_key: &Secret, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = master_key.expose(|key| {
        Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|err| KdbxError::Crypto(format!("Invalid cipher key or IV: {}", err)))
    })?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| {
            KdbxError::Integrity(
                "Could not decrypt database. Either the credentials were invalid or the database is corrupt.".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use md5::Md5;

    const KEY: &[u8] = b"nebuchadnezzarneotrinitymorpheus";
    const SEED: &[u8] = b"morpheusmorpheusmorpheusmorpheus";

    fn md5_hex(data: &[u8]) -> String {
        hex::encode(Md5::digest(data))
    }

    #[test]
    fn test_transform_key_zero_rounds_is_identity() {
        let out = transform_key(KEY, SEED, 0).unwrap();
        assert_eq!(out, KEY);
        assert_eq!(md5_hex(&out), "c2d9e5c83d750702ba8b26b30d612cbc");
    }

    #[test]
    fn test_transform_key_500_rounds() {
        let out = transform_key(KEY, SEED, 500).unwrap();
        assert_eq!(md5_hex(&out), "81c673b0dc17ba4d1a674298fa679d5d");
    }

    #[test]
    fn test_transform_key_1000_rounds() {
        let out = transform_key(KEY, SEED, 1000).unwrap();
        assert_eq!(md5_hex(&out), "e19a4a8b5ed0f14d5061571a8591517d");
    }

    #[test]
    fn test_transform_key_rejects_bad_seed() {
        let result = transform_key(KEY, b"short seed", 1);
        assert!(matches!(result, Err(KdbxError::InvalidParameter(_))));
    }

    #[test]
    fn test_build_master_key_reference_vector() {
        let composite = Secret::from_slice(KEY);
        let master_key = build_master_key(
            &composite,
            b"trinityapoctrinityapoctrinityapoc",
            SEED,
            1000,
        )
        .unwrap();

        master_key.expose(|key| {
            assert_eq!(
                hex::encode(key),
                "c0153df85e6118fb19a8abfcde44a8fe66076fc364a86f81e72880d76aa4dff0"
            );
        });
    }

    #[test]
    fn test_payload_roundtrip() {
        let key = Secret::from_slice(&[3u8; 32]);
        let iv = [7u8; 16];
        let plaintext = b"the payload does not align to the block size";

        let ciphertext = encrypt_payload(&key, &iv, plaintext).unwrap();
        assert_ne!(&ciphertext[..plaintext.len().min(ciphertext.len())], &plaintext[..]);
        assert_eq!(ciphertext.len() % 16, 0);

        let decrypted = decrypt_payload(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_payload_wrong_key_is_integrity_error() {
        let key = Secret::from_slice(&[3u8; 32]);
        let wrong_key = Secret::from_slice(&[4u8; 32]);
        let iv = [7u8; 16];

        let ciphertext = encrypt_payload(&key, &iv, b"some secret payload").unwrap();
        let result = decrypt_payload(&wrong_key, &iv, &ciphertext);
        assert!(matches!(result, Err(KdbxError::Integrity(_))));
    }
}
