use crate::error::{KdbxError, Result};
use crate::secret::Secret;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Combination priority of a password credential (combined first)
const PASSWORD_PRIORITY: u32 = 1;
/// Combination priority of a keyfile credential
const KEYFILE_PRIORITY: u32 = 100;

/// The credential variant kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Password,
    Keyfile,
}

/// Detected keyfile flavor: an XML wrapper with an embedded base64 key,
/// or an arbitrary binary file hashed as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyfileFormat {
    Xml,
    Binary,
}

/// A credential contributing 32 bytes of raw key material to the composite
/// hash. Closed set of variants; new credential kinds are added here, not by
/// structural typing.
pub enum Credential {
    Password(PasswordCredential),
    Keyfile(KeyfileCredential),
}

impl Credential {
    /// Raw 32-byte key material of this credential
    pub fn hash(&self) -> &[u8; 32] {
        match self {
            Credential::Password(c) => &c.hash,
            Credential::Keyfile(c) => &c.hash,
        }
    }

    /// Combination priority; lower values are combined first
    pub fn priority(&self) -> u32 {
        match self {
            Credential::Password(_) => PASSWORD_PRIORITY,
            Credential::Keyfile(_) => KEYFILE_PRIORITY,
        }
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Password(_) => CredentialKind::Password,
            Credential::Keyfile(_) => CredentialKind::Keyfile,
        }
    }
}

/// Password credential: key material is the SHA-256 of the password bytes.
/// Immutable once constructed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PasswordCredential {
    hash: [u8; 32],
}

impl PasswordCredential {
    pub fn new(password: &str) -> Self {
        Self {
            hash: Sha256::digest(password.as_bytes()).into(),
        }
    }
}

impl From<PasswordCredential> for Credential {
    fn from(c: PasswordCredential) -> Self {
        Credential::Password(c)
    }
}

/// Keyfile credential. If the file content carries an embedded
/// `<Data>…</Data>` element, the base64-decoded bytes are the key material
/// verbatim (no further hashing). Otherwise the whole raw content is hashed
/// with SHA-256. Immutable once constructed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyfileCredential {
    hash: [u8; 32],
    #[zeroize(skip)]
    format: KeyfileFormat,
}

impl KeyfileCredential {
    pub fn new(contents: &[u8]) -> Result<Self> {
        if let Some(encoded) = extract_embedded_key(contents) {
            let decoded = BASE64.decode(encoded.trim()).map_err(|err| {
                KdbxError::Credential(format!("Embedded keyfile data is not valid base64: {}", err))
            })?;
            let hash: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
                KdbxError::Credential(format!(
                    "Embedded keyfile data must decode to 32 bytes, got {}",
                    decoded.len()
                ))
            })?;
            Ok(Self {
                hash,
                format: KeyfileFormat::Xml,
            })
        } else {
            Ok(Self {
                hash: Sha256::digest(contents).into(),
                format: KeyfileFormat::Binary,
            })
        }
    }

    /// Detected keyfile flavor
    pub fn format(&self) -> KeyfileFormat {
        self.format
    }
}

impl From<KeyfileCredential> for Credential {
    fn from(c: KeyfileCredential) -> Self {
        Credential::Keyfile(c)
    }
}

/// Extract the base64 payload of a `<Data>…</Data>` element, if present
fn extract_embedded_key(contents: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(contents);
    let start = text.find("<Data>")? + "<Data>".len();
    let end = text[start..].find("</Data>")? + start;
    Some(text[start..end].to_string())
}

/// An ordered collection of credentials. Insertion order is irrelevant;
/// combination order is ascending by priority.
#[derive(Default)]
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a credential; no deduplication
    pub fn add(&mut self, credential: impl Into<Credential>) {
        self.credentials.push(credential.into());
    }

    /// Remove all credentials
    pub fn reset(&mut self) {
        self.credentials.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Combine all credentials into one composite hash: concatenate each
    /// credential's key material in ascending priority order and digest the
    /// concatenation with SHA-256. Deterministic and side-effect-free.
    ///
    /// An empty store is an error, never a silent zero key.
    pub fn build_composite_hash(&self) -> Result<Secret> {
        if self.credentials.is_empty() {
            return Err(KdbxError::Credential(
                "Cannot build a composite hash without credentials".to_string(),
            ));
        }

        let mut ordered: Vec<&Credential> = self.credentials.iter().collect();
        ordered.sort_by_key(|c| c.priority());

        let mut hasher = Sha256::new();
        for credential in ordered {
            hasher.update(credential.hash());
        }
        Ok(Secret::from_slice(&hasher.finalize()))
    }
}
