//! kdbxio - KDBX password-database container engine
//!
//! Loads and saves the encrypted single-file container format used by
//! KeePass 2.x (KDBX 3): a plaintext header followed by an encrypted,
//! compressed, integrity-checked payload holding an XML document tree,
//! some of whose values are additionally obfuscated with a stream cipher
//! while resident in memory.
//!
//! # Pipeline
//! Load: signature check → header parse → composite-key derivation →
//! AES-256-CBC decrypt → start-marker verify → hashed-block decode →
//! gunzip → tree parse → protected-field unlock. Save is the exact mirror.
//!
//! # Architecture
//! - `error`: error types and result alias
//! - `secret`: zeroizing wrappers for key material
//! - `credentials`: password/keyfile credentials and composite hashing
//! - `format`: file signatures and the typed header field table
//! - `crypto`: key stretching, master-key derivation, payload cipher
//! - `hbio`: chunked hash-verified block codec
//! - `stream`: Salsa20 lock/unlock of protected document values
//! - `xml`: generic attributed document tree (parse/serialize/traverse)
//! - `engine`: load/save pipeline orchestration
//! - `db`: thin file-backed facade
//!
//! # Example
//! ```rust,ignore
//! use kdbxio::{Database, PasswordCredential};
//!
//! let mut db = Database::new();
//! db.add_credential(PasswordCredential::new("nebuchadnezzar"));
//! db.load_file("passwords.kdbx")?;
//! ```

pub mod credentials;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod error;
pub mod format;
pub mod hbio;
pub mod secret;
pub mod stream;
pub mod xml;

// Re-export commonly used types
pub use credentials::{
    Credential, CredentialKind, CredentialStore, KeyfileCredential, KeyfileFormat,
    PasswordCredential,
};
pub use crypto::{build_master_key, transform_key};
pub use db::Database;
pub use engine::DatabaseEngine;
pub use error::{KdbxError, Result};
pub use format::{ContainerHeader, HeaderField, BASE_SIGNATURE, VERSION_SIGNATURE};
pub use secret::Secret;
pub use stream::StreamFieldCipher;
pub use xml::XmlNode;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify that key types are accessible
        let _secret = Secret::new(vec![1, 2, 3]);
        let _store = CredentialStore::new();
        let _engine = DatabaseEngine::new();

        // Verify error types
        let _err: Result<()> = Err(KdbxError::Format("test".to_string()));

        // Verify format constants
        assert_eq!(BASE_SIGNATURE, 0x9AA2_D903);
        assert_eq!(VERSION_SIGNATURE, 0xB54B_FB67);
    }
}
