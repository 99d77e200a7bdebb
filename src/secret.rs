use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A wrapper around sensitive byte material that:
/// - Zeroes memory on drop
/// - Prevents debug printing to avoid leaking into logs
/// - Provides controlled access via closures
///
/// Used for the composite credential hash and the derived master key, both
/// of which are ephemeral: created for a single load or save call and
/// discarded afterwards.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    data: Vec<u8>,
}

impl Secret {
    /// Create a new Secret, taking ownership of the byte vector
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Create a new Secret by copying a byte slice
    pub fn from_slice(slice: &[u8]) -> Self {
        Self {
            data: slice.to_vec(),
        }
    }

    /// Length of the secret data in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the secret is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Access the secret data through a closure.
    ///
    /// SECURITY: the data is exposed only within the closure scope to
    /// minimize exposure time.
    pub fn expose<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(&self.data)
    }
}

// SECURITY: no Clone, to prevent accidental copies of key material.

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("data", &"<redacted>")
            .finish()
    }
}
