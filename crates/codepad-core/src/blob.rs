//! Content-addressed in-memory cache for generated artifacts.
//!
//! Profile reports produced during a run are parked here and served to the
//! client out-of-band over HTTP, keyed by the hex digest of their bytes.

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// An opaque byte payload plus its MIME type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
    pub mime: String,
}

/// Synchronized map of content digests to blobs.
///
/// Identity is derived from the data alone, so inserting identical bytes
/// under a different MIME collides deliberately: the first entry wins and
/// its MIME is preserved.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: Mutex<HashMap<String, Blob>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a blob and return its id. Idempotent.
    pub fn insert(&self, blob: Blob) -> String {
        let id = digest_hex(&blob.data);
        let mut blobs = self.blobs.lock().unwrap();
        blobs.entry(id.clone()).or_insert(blob);
        id
    }

    /// Look up a blob by id.
    pub fn retrieve(&self, id: &str) -> Option<Blob> {
        self.blobs.lock().unwrap().get(id).cloned()
    }

    /// Remove a blob by id. Unknown ids are a no-op.
    pub fn delete(&self, id: &str) {
        self.blobs.lock().unwrap().remove(id);
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercase hex SHA-256 of `data`.
fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push(char::from_digit((b >> 4) as u32, 16).unwrap());
        out.push(char::from_digit((b & 0x0f) as u32, 16).unwrap());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let bs = BlobStore::new();
        let id1 = bs.insert(Blob {
            data: b"report".to_vec(),
            mime: "image/svg+xml".to_string(),
        });
        let id2 = bs.insert(Blob {
            data: b"report".to_vec(),
            mime: "text/html".to_string(),
        });
        assert_eq!(id1, id2);
        assert_eq!(bs.len(), 1);

        // The first MIME wins.
        assert_eq!(bs.retrieve(&id1).unwrap().mime, "image/svg+xml");
    }

    #[test]
    fn distinct_content_gets_distinct_ids() {
        let bs = BlobStore::new();
        let id1 = bs.insert(Blob {
            data: b"a".to_vec(),
            mime: String::new(),
        });
        let id2 = bs.insert(Blob {
            data: b"b".to_vec(),
            mime: String::new(),
        });
        assert_ne!(id1, id2);
        assert_eq!(bs.len(), 2);
    }

    #[test]
    fn delete_and_miss() {
        let bs = BlobStore::new();
        let id = bs.insert(Blob {
            data: b"x".to_vec(),
            mime: String::new(),
        });
        assert!(bs.retrieve(&id).is_some());
        bs.delete(&id);
        assert!(bs.retrieve(&id).is_none());
        assert!(bs.is_empty());
        bs.delete("no-such-id");
    }
}
