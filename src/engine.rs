use crate::credentials::CredentialStore;
use crate::crypto::{build_master_key, decrypt_payload, encrypt_payload};
use crate::error::{KdbxError, Result};
use crate::format::{
    ContainerHeader, HeaderField, BASE_SIGNATURE, DEFAULT_FILE_VERSION, SIGNATURE_SIZE,
    VERSION_SIGNATURE,
};
use crate::hbio;
use crate::secret::Secret;
use crate::stream::StreamFieldCipher;
use crate::xml::{self, XmlNode};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use subtle::ConstantTimeEq;

/// CompressionFlags value indicating a gzip-compressed document
const COMPRESSION_GZIP: u32 = 1;

/// Orchestrates the full load and save pipelines of a database container.
///
/// The engine retains the header and document tree for the database's
/// in-memory lifetime, so repeated saves need no re-supplied seeds. The
/// master key is recomputed per call and never cached. A single engine
/// instance must not be used for overlapping calls; callers serialize
/// access per instance.
pub struct DatabaseEngine {
    header: Option<ContainerHeader>,
    file_version: u32,
    tree: Option<XmlNode>,
}

impl Default for DatabaseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseEngine {
    /// An empty engine; populate it with `load`
    pub fn new() -> Self {
        Self {
            header: None,
            file_version: DEFAULT_FILE_VERSION,
            tree: None,
        }
    }

    /// An engine for a brand-new database: default header with fresh random
    /// seeds, plus the given document tree
    pub fn create(tree: XmlNode) -> Self {
        Self {
            header: Some(ContainerHeader::with_defaults()),
            file_version: DEFAULT_FILE_VERSION,
            tree: Some(tree),
        }
    }

    /// Header of the loaded or created database
    pub fn header(&self) -> Option<&ContainerHeader> {
        self.header.as_ref()
    }

    pub fn header_mut(&mut self) -> Option<&mut ContainerHeader> {
        self.header.as_mut()
    }

    /// The current document tree (unlocked, in-memory form)
    pub fn tree(&self) -> Option<&XmlNode> {
        self.tree.as_ref()
    }

    pub fn tree_mut(&mut self) -> Option<&mut XmlNode> {
        self.tree.as_mut()
    }

    /// Replace the document tree
    pub fn set_tree(&mut self, tree: XmlNode) {
        self.tree = Some(tree);
    }

    /// File format version field, carried through as an opaque value
    pub fn file_version(&self) -> u32 {
        self.file_version
    }

    /// Load a database from a byte buffer. On success the engine retains
    /// the header and the unlocked document tree; any stage failure aborts
    /// the whole pipeline and leaves the engine unchanged.
    pub fn load(&mut self, data: &[u8], credentials: &CredentialStore) -> Result<()> {
        // 1. Signature prologue
        if data.len() < SIGNATURE_SIZE {
            return Err(KdbxError::Format(
                "File is too short to contain the database signatures.".to_string(),
            ));
        }
        let base_signature = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let version_signature = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let file_version = u32::from_le_bytes(data[8..12].try_into().unwrap());

        if base_signature != BASE_SIGNATURE {
            return Err(KdbxError::Format(
                "Database base signature does not match. The file might be corrupt.".to_string(),
            ));
        }
        if version_signature != VERSION_SIGNATURE {
            return Err(KdbxError::Format(
                "This database version is not supported.".to_string(),
            ));
        }

        // 2. Header field table
        let header = ContainerHeader::parse(data, SIGNATURE_SIZE)?;
        let payload_offset = SIGNATURE_SIZE + header.header_length();

        // 3. Master key
        let master_key = derive_master_key(&header, credentials)?;

        // 4. Outer block cipher
        let iv = header.get(HeaderField::EncryptionIv)?;
        let decrypted = decrypt_payload(&master_key, iv, &data[payload_offset..])?;

        // 5. Known-plaintext start marker
        let start_bytes = header.get(HeaderField::StreamStartBytes)?;
        let prefix_matches = decrypted.len() >= start_bytes.len()
            && bool::from(decrypted[..start_bytes.len()].ct_eq(start_bytes));
        if !prefix_matches {
            return Err(KdbxError::Integrity(
                "Stream start bytes were invalid. Either the credentials were invalid or the database is corrupt.".to_string(),
            ));
        }

        // 6. Hashed block stream
        let decoded = hbio::decode(&decrypted[start_bytes.len()..])?;

        // 7. Optional compression
        let document = if header.compression_flags()? == COMPRESSION_GZIP {
            gunzip(&decoded)?
        } else {
            decoded
        };

        // 8. Document tree
        let mut tree = xml::parse(&document)?;

        // 9. Unlock protected values in fixed pre-order
        let mut cipher = StreamFieldCipher::new(header.get(HeaderField::ProtectedStreamKey)?);
        unlock_tree(&mut tree, &mut cipher)?;

        // 10. Retain for the database's in-memory lifetime
        self.header = Some(header);
        self.file_version = file_version;
        self.tree = Some(tree);
        Ok(())
    }

    /// Save the retained database to a byte buffer, the exact mirror of
    /// `load`. The credential store may differ from the one used at load
    /// time. The engine performs no file I/O itself.
    pub fn save(&self, credentials: &CredentialStore) -> Result<Vec<u8>> {
        let header = self.header.as_ref().ok_or_else(|| {
            KdbxError::InvalidParameter(
                "No header present; load a database or create a new one first.".to_string(),
            )
        })?;
        let tree = self.tree.as_ref().ok_or_else(|| {
            KdbxError::InvalidParameter("No document tree to save.".to_string())
        })?;

        // 1. Master key (recomputed, never cached)
        let master_key = derive_master_key(header, credentials)?;

        // 2-3. Lock protected values on a clone, same pre-order as load;
        // the retained tree stays in its unlocked in-memory form
        let mut locked = tree.clone();
        let mut cipher = StreamFieldCipher::new(header.get(HeaderField::ProtectedStreamKey)?);
        lock_tree(&mut locked, &mut cipher)?;

        // 4. Serialize the tree
        let document = xml::serialize(&locked)?;

        // 5. Optional compression
        let compressed = if header.compression_flags()? == COMPRESSION_GZIP {
            gzip(&document)?
        } else {
            document
        };

        // 6. Start marker + hashed block stream
        let mut payload = header.get(HeaderField::StreamStartBytes)?.to_vec();
        payload.extend_from_slice(&hbio::encode(&compressed));

        // 7. Outer block cipher
        let encrypted =
            encrypt_payload(&master_key, header.get(HeaderField::EncryptionIv)?, &payload)?;

        // 8-9. Signatures, header region, ciphertext
        let header_bytes = header.serialize();
        let mut out = Vec::with_capacity(SIGNATURE_SIZE + header_bytes.len() + encrypted.len());
        out.extend_from_slice(&BASE_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&VERSION_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.file_version.to_le_bytes());
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&encrypted);
        Ok(out)
    }
}

fn derive_master_key(header: &ContainerHeader, credentials: &CredentialStore) -> Result<Secret> {
    let composite_hash = credentials.build_composite_hash()?;
    build_master_key(
        &composite_hash,
        header.get(HeaderField::MasterSeed)?,
        header.get(HeaderField::TransformSeed)?,
        header.transform_rounds()?,
    )
}

// Node text is UTF-8 by data model, so a protected payload that unlocks to
// arbitrary non-text bytes is rejected rather than stored lossily.
fn unlock_tree(tree: &mut XmlNode, cipher: &mut StreamFieldCipher) -> Result<()> {
    xml::for_each_protected(tree, &mut |node| {
        let raw = BASE64.decode(node.text.trim()).map_err(|err| {
            KdbxError::Parse(format!("Protected value is not valid base64: {}", err))
        })?;
        let plain = cipher.unlock(&raw);
        node.text = String::from_utf8(plain).map_err(|_| {
            KdbxError::Parse("Protected value did not unlock to UTF-8 text.".to_string())
        })?;
        Ok(())
    })
}

fn lock_tree(tree: &mut XmlNode, cipher: &mut StreamFieldCipher) -> Result<()> {
    xml::for_each_protected(tree, &mut |node| {
        let locked = cipher.lock(node.text.as_bytes());
        node.text = BASE64.encode(locked);
        Ok(())
    })
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|err| KdbxError::Decompression(format!("Could not decompress database: {}", err)))?;
    Ok(out)
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(|err| {
        KdbxError::Decompression(format!("Could not compress database: {}", err))
    })?;
    encoder.finish().map_err(|err| {
        KdbxError::Decompression(format!("Could not compress database: {}", err))
    })
}
