use crate::credentials::{Credential, CredentialStore};
use crate::engine::DatabaseEngine;
use crate::error::Result;
use crate::xml::XmlNode;
use std::fs;
use std::path::Path;

/// Thin caller-facing facade pairing a credential store with an engine and
/// adding file read/write wrappers. All pipeline work happens in
/// [`DatabaseEngine`]; this type only moves bytes to and from disk.
#[derive(Default)]
pub struct Database {
    credentials: CredentialStore,
    engine: DatabaseEngine,
}

impl Database {
    /// An empty database; add credentials and call `load_file`
    pub fn new() -> Self {
        Self::default()
    }

    /// A brand-new database around the given document tree, with a default
    /// header (fresh random seeds)
    pub fn create(tree: XmlNode) -> Self {
        Self {
            credentials: CredentialStore::new(),
            engine: DatabaseEngine::create(tree),
        }
    }

    pub fn add_credential(&mut self, credential: impl Into<Credential>) {
        self.credentials.add(credential);
    }

    pub fn reset_credentials(&mut self) {
        self.credentials.reset();
    }

    /// Read and load a database file with the current credentials
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let contents = fs::read(path)?;
        self.engine.load(&contents, &self.credentials)
    }

    /// Save the database with the current credentials and write it to disk
    pub fn save_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let contents = self.engine.save(&self.credentials)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// The underlying engine, for header and tree access
    pub fn engine(&self) -> &DatabaseEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DatabaseEngine {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::PasswordCredential;
    use crate::error::KdbxError;

    fn sample_tree() -> XmlNode {
        let mut value = XmlNode::new("Value");
        value
            .attributes
            .push(("Protected".to_string(), "True".to_string()));
        value.text = "file roundtrip secret".to_string();

        let mut root = XmlNode::new("KeePassFile");
        root.children.push(value);
        root
    }

    #[test]
    fn test_file_roundtrip() {
        let path = std::env::temp_dir().join("kdbxio_test_roundtrip.kdbx");

        let mut db = Database::create(sample_tree());
        db.add_credential(PasswordCredential::new("nebuchadnezzar"));
        db.save_file(&path).unwrap();

        let mut reloaded = Database::new();
        reloaded.add_credential(PasswordCredential::new("nebuchadnezzar"));
        reloaded.load_file(&path).unwrap();
        assert_eq!(reloaded.engine().tree().unwrap(), &sample_tree());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_reset_credentials_then_load_fails() {
        let path = std::env::temp_dir().join("kdbxio_test_reset.kdbx");

        let mut db = Database::create(sample_tree());
        db.add_credential(PasswordCredential::new("nebuchadnezzar"));
        db.save_file(&path).unwrap();

        db.reset_credentials();
        let result = db.load_file(&path);
        assert!(matches!(result, Err(KdbxError::Credential(_))));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut db = Database::new();
        db.add_credential(PasswordCredential::new("nebuchadnezzar"));
        let result = db.load_file("/this-file-should-never-exist.kdbx");
        assert!(matches!(result, Err(KdbxError::Io(_))));
    }
}
