use salsa20::cipher::{KeyIvInit, StreamCipher};
use salsa20::Salsa20;
use sha2::{Digest, Sha256};

/// Fixed Salsa20 nonce of the protected-field stream, a format constant
pub const STREAM_NONCE: [u8; 8] = [0xE8, 0x30, 0x09, 0x4B, 0x97, 0x20, 0x5D, 0x2A];

/// Stateful keystream cipher used to lock and unlock protected document
/// values, keyed by `SHA-256(ProtectedStreamKey)`.
///
/// The keystream position is a single running counter shared across all
/// fields: one instance must be constructed per load or save call, and
/// protected nodes must be visited in one fixed pre-order traversal with
/// exactly one `unlock`/`lock` call per node. Visiting out of order,
/// skipping a node or reusing an instance across traversals desynchronizes
/// the stream and corrupts every subsequent field.
pub struct StreamFieldCipher {
    cipher: Salsa20,
}

impl StreamFieldCipher {
    pub fn new(protected_stream_key: &[u8]) -> Self {
        let key: [u8; 32] = Sha256::digest(protected_stream_key).into();
        Self {
            cipher: Salsa20::new(&key.into(), &STREAM_NONCE.into()),
        }
    }

    /// Unlock a protected value, consuming keystream for its length
    pub fn unlock(&mut self, ciphertext: &[u8]) -> Vec<u8> {
        self.apply(ciphertext)
    }

    /// Lock a plaintext value, consuming keystream for its length
    pub fn lock(&mut self, plaintext: &[u8]) -> Vec<u8> {
        self.apply(plaintext)
    }

    // XOR with the keystream; self-inverse, advances the shared position
    fn apply(&mut self, input: &[u8]) -> Vec<u8> {
        let mut buffer = input.to_vec();
        self.cipher.apply_keystream(&mut buffer);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"protected-stream-key-material";

    #[test]
    fn test_lock_unlock_single_value() {
        let plaintext = b"s3cr3t passphrase";

        let mut locker = StreamFieldCipher::new(KEY);
        let locked = locker.lock(plaintext);
        assert_ne!(locked, plaintext);

        let mut unlocker = StreamFieldCipher::new(KEY);
        assert_eq!(unlocker.unlock(&locked), plaintext);
    }

    #[test]
    fn test_sequential_fields_roundtrip_in_order() {
        let values: [&[u8]; 4] = [b"alpha", b"", b"a much longer protected value", b"z"];

        let mut locker = StreamFieldCipher::new(KEY);
        let locked: Vec<Vec<u8>> = values.iter().map(|v| locker.lock(v)).collect();

        let mut unlocker = StreamFieldCipher::new(KEY);
        for (locked_value, original) in locked.iter().zip(values.iter()) {
            assert_eq!(unlocker.unlock(locked_value), *original);
        }
    }

    #[test]
    fn test_keystream_position_advances() {
        let mut first = StreamFieldCipher::new(KEY);
        let a = first.lock(b"same input");
        let b = first.lock(b"same input");
        // Same input at different stream positions yields different output
        assert_ne!(a, b);
    }

    #[test]
    fn test_skipping_a_field_desynchronizes() {
        let mut locker = StreamFieldCipher::new(KEY);
        let first = locker.lock(b"first");
        let second = locker.lock(b"second");

        let mut unlocker = StreamFieldCipher::new(KEY);
        // Skip the first field: the second can no longer be recovered
        let _ = first;
        assert_ne!(unlocker.unlock(&second), b"second");
    }
}
