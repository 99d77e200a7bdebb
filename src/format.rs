use crate::error::{KdbxError, Result};
use rand::RngCore;
use std::collections::BTreeMap;

/// Base signature identifying a KDBX container (bytes 0-3, little-endian)
pub const BASE_SIGNATURE: u32 = 0x9AA2_D903;

/// Version signature of the supported format generation (bytes 4-7)
pub const VERSION_SIGNATURE: u32 = 0xB54B_FB67;

/// Length of the signature prologue: base + version signature + file version
pub const SIGNATURE_SIZE: usize = 12;

/// File format version written for newly created databases (3.1)
pub const DEFAULT_FILE_VERSION: u32 = 0x0003_0001;

/// Cipher UUID of AES-256, the only outer cipher of this format generation
pub const AES_CIPHER_ID: [u8; 16] = [
    0x31, 0xC1, 0xF2, 0xE6, 0xBF, 0x71, 0x43, 0x50, 0xBE, 0x58, 0x05, 0x21, 0x6A, 0xFC, 0x5A, 0xFF,
];

/// Key-stretching rounds written for newly created databases
pub const DEFAULT_TRANSFORM_ROUNDS: u64 = 6000;

/// Typed header field identifiers. The set is strict: an id outside this
/// table is a format error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum HeaderField {
    /// Sentinel terminator; its payload is carried through verbatim
    EndOfHeader = 0,
    Comment = 1,
    CipherId = 2,
    CompressionFlags = 3,
    MasterSeed = 4,
    TransformSeed = 5,
    TransformRounds = 6,
    EncryptionIv = 7,
    ProtectedStreamKey = 8,
    StreamStartBytes = 9,
    InnerRandomStreamId = 10,
}

impl HeaderField {
    fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => HeaderField::EndOfHeader,
            1 => HeaderField::Comment,
            2 => HeaderField::CipherId,
            3 => HeaderField::CompressionFlags,
            4 => HeaderField::MasterSeed,
            5 => HeaderField::TransformSeed,
            6 => HeaderField::TransformRounds,
            7 => HeaderField::EncryptionIv,
            8 => HeaderField::ProtectedStreamKey,
            9 => HeaderField::StreamStartBytes,
            10 => HeaderField::InnerRandomStreamId,
            _ => return None,
        })
    }
}

/// Typed field table parsed from (or serialized to) the plaintext header
/// region: a sequence of `{1-byte id, 2-byte LE length, value bytes}`
/// records terminated by the EndOfHeader id.
///
/// The byte length of the parsed region is recorded so a later
/// serialization reproduces a region of identical length.
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    fields: BTreeMap<HeaderField, Vec<u8>>,
    header_length: usize,
}

impl ContainerHeader {
    /// Parse the header region of `data` starting at `offset`.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let mut fields = BTreeMap::new();
        let mut cursor = offset;

        loop {
            if cursor + 3 > data.len() {
                return Err(KdbxError::Format(
                    "Header region is truncated. The database might be corrupt.".to_string(),
                ));
            }

            let field = HeaderField::from_id(data[cursor]).ok_or_else(|| {
                KdbxError::Format(format!(
                    "Invalid header field id {}. The database might be corrupt.",
                    data[cursor]
                ))
            })?;
            let length = u16::from_le_bytes([data[cursor + 1], data[cursor + 2]]) as usize;
            cursor += 3;

            if cursor + length > data.len() {
                return Err(KdbxError::Format(format!(
                    "Header field {:?} extends past the end of the file.",
                    field
                )));
            }
            // Zero-length records are legal and must survive a reserialize
            fields.insert(field, data[cursor..cursor + length].to_vec());
            cursor += length;

            if field == HeaderField::EndOfHeader {
                break;
            }
        }

        Ok(Self {
            fields,
            header_length: cursor - offset,
        })
    }

    /// Serialize the header back to its record form. Fields are emitted in
    /// ascending id order with the EndOfHeader record (and its recorded
    /// payload) last, producing a region of the originally parsed length.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_length);
        for (field, value) in &self.fields {
            if *field == HeaderField::EndOfHeader {
                continue;
            }
            write_field(&mut out, *field, value);
        }
        let terminator = self
            .fields
            .get(&HeaderField::EndOfHeader)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        write_field(&mut out, HeaderField::EndOfHeader, terminator);
        out
    }

    /// Raw bytes of a field; a missing required field is a format error
    pub fn get(&self, field: HeaderField) -> Result<&[u8]> {
        self.fields
            .get(&field)
            .map(Vec::as_slice)
            .ok_or_else(|| KdbxError::Format(format!("Header field {:?} is missing.", field)))
    }

    /// Store raw bytes for a field, replacing any previous value
    pub fn set(&mut self, field: HeaderField, value: Vec<u8>) {
        self.fields.insert(field, value);
        self.header_length = self.serialized_length();
    }

    /// Byte length of the header region as parsed (or as it will serialize)
    pub fn header_length(&self) -> usize {
        self.header_length
    }

    /// Key-stretching round count, stored little-endian (up to 8 bytes)
    pub fn transform_rounds(&self) -> Result<u64> {
        let bytes = self.get(HeaderField::TransformRounds)?;
        if bytes.is_empty() || bytes.len() > 8 {
            return Err(KdbxError::Format(format!(
                "TransformRounds must be 1-8 bytes, got {}",
                bytes.len()
            )));
        }
        let mut raw = [0u8; 8];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Compression flags, stored as a little-endian u32; 1 means gzip
    pub fn compression_flags(&self) -> Result<u32> {
        let bytes = self.get(HeaderField::CompressionFlags)?;
        if bytes.is_empty() || bytes.len() > 4 {
            return Err(KdbxError::Format(format!(
                "CompressionFlags must be 1-4 bytes, got {}",
                bytes.len()
            )));
        }
        let mut raw = [0u8; 4];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(u32::from_le_bytes(raw))
    }

    /// Build a header for a brand-new database: fresh random seeds, gzip
    /// compression, the AES cipher id and the default round count.
    pub fn with_defaults() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(HeaderField::CipherId, AES_CIPHER_ID.to_vec());
        fields.insert(HeaderField::CompressionFlags, 1u32.to_le_bytes().to_vec());
        fields.insert(HeaderField::MasterSeed, random_bytes(32));
        fields.insert(HeaderField::TransformSeed, random_bytes(32));
        fields.insert(
            HeaderField::TransformRounds,
            DEFAULT_TRANSFORM_ROUNDS.to_le_bytes().to_vec(),
        );
        fields.insert(HeaderField::EncryptionIv, random_bytes(16));
        fields.insert(HeaderField::ProtectedStreamKey, random_bytes(32));
        fields.insert(HeaderField::StreamStartBytes, random_bytes(32));
        // 2 = Salsa20, the inner stream of this format generation
        fields.insert(
            HeaderField::InnerRandomStreamId,
            2u32.to_le_bytes().to_vec(),
        );
        fields.insert(HeaderField::EndOfHeader, b"\r\n\r\n".to_vec());

        let mut header = Self {
            fields,
            header_length: 0,
        };
        header.header_length = header.serialized_length();
        header
    }

    fn serialized_length(&self) -> usize {
        self.fields.values().map(|v| 3 + v.len()).sum::<usize>()
            + if self.fields.contains_key(&HeaderField::EndOfHeader) {
                0
            } else {
                3
            }
    }
}

fn write_field(out: &mut Vec<u8>, field: HeaderField, value: &[u8]) {
    out.push(field as u8);
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}
