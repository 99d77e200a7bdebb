use crate::error::{KdbxError, Result};
use sha2::{Digest, Sha256};

/// Fixed chunk size of the hashed block stream (1 MiB)
pub const BLOCK_SIZE: usize = 1024 * 1024;

const INDEX_SIZE: usize = 4;
const HASH_SIZE: usize = 32;
const LENGTH_SIZE: usize = 4;
const BLOCK_HEADER_SIZE: usize = INDEX_SIZE + HASH_SIZE + LENGTH_SIZE;

/// Encode a plaintext buffer as a chunked, self-verifying block stream.
///
/// Each block is `{4-byte LE sequence index, 32-byte SHA-256 of the chunk,
/// 4-byte LE chunk length, chunk bytes}`. The stream ends with a terminal
/// block carrying the next index, an all-zero digest and length 0.
pub fn encode(plaintext: &[u8]) -> Vec<u8> {
    let chunk_count = plaintext.len().div_ceil(BLOCK_SIZE);
    let mut out = Vec::with_capacity(plaintext.len() + (chunk_count + 1) * BLOCK_HEADER_SIZE);

    let mut index: u32 = 0;
    for chunk in plaintext.chunks(BLOCK_SIZE) {
        out.extend_from_slice(&index.to_le_bytes());
        out.extend_from_slice(&Sha256::digest(chunk));
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(chunk);
        index += 1;
    }

    // Terminal block: zero digest, zero length
    out.extend_from_slice(&index.to_le_bytes());
    out.extend_from_slice(&[0u8; HASH_SIZE]);
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

/// Decode a chunked block stream, verifying each chunk digest.
///
/// Fails fast: the first digest or sequence mismatch aborts with an
/// integrity error and no partial output is returned.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut cursor = 0;
    let mut expected_index: u32 = 0;

    loop {
        if cursor + BLOCK_HEADER_SIZE > data.len() {
            return Err(KdbxError::Format(
                "Block stream is truncated. The database might be corrupt.".to_string(),
            ));
        }

        let index = u32::from_le_bytes(data[cursor..cursor + 4].try_into().unwrap());
        let stored_hash = &data[cursor + 4..cursor + 36];
        let length =
            u32::from_le_bytes(data[cursor + 36..cursor + 40].try_into().unwrap()) as usize;
        cursor += BLOCK_HEADER_SIZE;

        if index != expected_index {
            return Err(KdbxError::Integrity(format!(
                "Block stream out of sequence: expected block {}, found {}",
                expected_index, index
            )));
        }

        if length == 0 {
            return Ok(out);
        }

        if cursor + length > data.len() {
            return Err(KdbxError::Format(
                "Block chunk extends past the end of the stream.".to_string(),
            ));
        }
        let chunk = &data[cursor..cursor + length];
        cursor += length;

        let computed: [u8; 32] = Sha256::digest(chunk).into();
        if computed.as_slice() != stored_hash {
            return Err(KdbxError::Integrity(format!(
                "Block {} failed its hash check. The database might be corrupt.",
                index
            )));
        }

        out.extend_from_slice(chunk);
        expected_index += 1;
    }
}
