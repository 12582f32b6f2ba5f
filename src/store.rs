//! Template persistence
//!
//! One record per user identifier holding the serialized template blob,
//! encrypted at rest with XChaCha20-Poly1305. The storage backend is
//! swappable behind [`TemplateStore`]; [`FileTemplateStore`] keeps one
//! record file per user under the data directory.

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::biometric::UserId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failure")]
    Io(#[from] io::Error),

    #[error("no template stored for user {0}")]
    NotFound(UserId),

    #[error("stored record for user {0} is corrupt")]
    Corrupt(UserId),

    #[error("template encryption failure")]
    Crypto,

    #[error("invalid encryption key file")]
    KeyInvalid,
}

/// Listing entry for one stored template.
#[derive(Debug, Clone)]
pub struct StoredProfile {
    pub user: UserId,
    pub created_at: String,
    pub checksum: String,
}

/// Persistent store keyed by user identifier.
///
/// `get` distinguishes an absent record (`None`) from an unreadable one
/// (`Corrupt`); callers must never conflate the two. Writes replace any
/// existing record for the same user (re-enrollment is an explicit user
/// action, last writer wins).
pub trait TemplateStore {
    fn get(&self, user: UserId) -> Result<Option<Vec<u8>>, StoreError>;
    fn put(&self, user: UserId, template: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, user: UserId) -> Result<(), StoreError>;
    fn exists(&self, user: UserId) -> bool;
    fn list(&self) -> Result<Vec<StoredProfile>, StoreError>;
}

/// On-disk record layout: encrypted template plus unencrypted metadata.
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    /// XChaCha20-Poly1305 nonce (192-bit)
    nonce: Vec<u8>,
    /// Encrypted template blob
    ciphertext: Vec<u8>,
    /// RFC 3339 creation timestamp
    created_at: String,
    /// SHA-256 of the plaintext template bytes
    sha256: String,
}

/// File-backed template store, one `<user>.tpl` record per user.
pub struct FileTemplateStore {
    root: PathBuf,
    encryption_key: Zeroizing<[u8; 32]>,
}

impl FileTemplateStore {
    /// Open the store rooted at `root`, creating the directory and the
    /// encryption key on first use.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(root)?;
        let encryption_key = Self::get_or_create_encryption_key(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            encryption_key,
        })
    }

    fn get_or_create_encryption_key(root: &Path) -> Result<Zeroizing<[u8; 32]>, StoreError> {
        let key_path = root.join(".key");

        let key = if key_path.exists() {
            let key_bytes = fs::read(&key_path)?;
            if key_bytes.len() != 32 {
                return Err(StoreError::KeyInvalid);
            }
            let mut key_array = Zeroizing::new([0u8; 32]);
            key_array.copy_from_slice(&key_bytes);
            key_array
        } else {
            let mut key_array = Zeroizing::new([0u8; 32]);
            OsRng.fill_bytes(&mut *key_array);

            fs::write(&key_path, &*key_array)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))?;
            }

            log::info!("generated new template encryption key");
            key_array
        };

        Ok(key)
    }

    fn record_path(&self, user: UserId) -> PathBuf {
        self.root.join(format!("{}.tpl", user))
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<StoredRecord, StoreError> {
        let cipher = XChaCha20Poly1305::new((&*self.encryption_key).into());

        let mut nonce_bytes = [0u8; 24];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| StoreError::Crypto)?;

        let mut hasher = Sha256::new();
        hasher.update(plaintext);

        Ok(StoredRecord {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
            created_at: chrono::Utc::now().to_rfc3339(),
            sha256: hex::encode(hasher.finalize()),
        })
    }

    fn decrypt(&self, user: UserId, record: &StoredRecord) -> Result<Vec<u8>, StoreError> {
        let cipher = XChaCha20Poly1305::new((&*self.encryption_key).into());

        let nonce: &XNonce = record
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Corrupt(user))?;

        let plaintext = cipher
            .decrypt(nonce, record.ciphertext.as_ref())
            .map_err(|_| StoreError::Corrupt(user))?;

        let mut hasher = Sha256::new();
        hasher.update(&plaintext);
        if hex::encode(hasher.finalize()) != record.sha256 {
            return Err(StoreError::Corrupt(user));
        }

        Ok(plaintext)
    }

    fn read_record(&self, user: UserId) -> Result<Option<StoredRecord>, StoreError> {
        let path = self.record_path(user);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&json).map_err(|_| StoreError::Corrupt(user))?;
        Ok(Some(record))
    }
}

impl TemplateStore for FileTemplateStore {
    fn get(&self, user: UserId) -> Result<Option<Vec<u8>>, StoreError> {
        match self.read_record(user)? {
            Some(record) => self.decrypt(user, &record).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, user: UserId, template: &[u8]) -> Result<(), StoreError> {
        let record = self.encrypt(template)?;
        let json = serde_json::to_string_pretty(&record).map_err(|_| StoreError::Crypto)?;

        // Write-then-rename: the store must never hold a partial record
        let path = self.record_path(user);
        let tmp_path = self.root.join(format!("{}.tpl.tmp", user));
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;

        log::info!(
            "template stored for user {} ({} bytes, sha256 {})",
            user,
            template.len(),
            &record.sha256[..12]
        );
        Ok(())
    }

    fn delete(&self, user: UserId) -> Result<(), StoreError> {
        let path = self.record_path(user);
        if !path.exists() {
            return Err(StoreError::NotFound(user));
        }
        fs::remove_file(&path)?;
        log::info!("deleted template for user {}", user);
        Ok(())
    }

    fn exists(&self, user: UserId) -> bool {
        self.record_path(user).exists()
    }

    fn list(&self) -> Result<Vec<StoredProfile>, StoreError> {
        let mut profiles = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("tpl") {
                continue;
            }
            let user = match path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<UserId>().ok())
            {
                Some(user) => user,
                None => {
                    log::warn!("ignoring stray file in store: {}", path.display());
                    continue;
                }
            };
            match self.read_record(user) {
                Ok(Some(record)) => profiles.push(StoredProfile {
                    user,
                    created_at: record.created_at,
                    checksum: record.sha256,
                }),
                Ok(None) => {}
                Err(e) => log::warn!("skipping unreadable record for user {}: {}", user, e),
            }
        }

        profiles.sort_by_key(|p| p.user.0);
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileTemplateStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = FileTemplateStore::open(dir.path()).expect("open store");
        (dir, store)
    }

    #[test]
    fn test_put_get_round_trip() {
        let (_dir, store) = store();
        let blob = b"template-bytes".to_vec();

        store.put(UserId(42), &blob).unwrap();
        assert_eq!(store.get(UserId(42)).unwrap(), Some(blob));
    }

    #[test]
    fn test_absent_user_is_none_not_error() {
        let (_dir, store) = store();
        assert!(store.get(UserId(42)).unwrap().is_none());
        assert!(!store.exists(UserId(42)));
    }

    #[test]
    fn test_record_is_encrypted_at_rest() {
        let (dir, store) = store();
        let blob = b"very-recognizable-template-plaintext".to_vec();
        store.put(UserId(7), &blob).unwrap();

        let raw = fs::read(dir.path().join("7.tpl")).unwrap();
        assert!(!raw.windows(blob.len()).any(|w| w == blob.as_slice()));
    }

    #[test]
    fn test_tampered_record_reads_corrupt() {
        let (dir, store) = store();
        store.put(UserId(9), b"payload").unwrap();

        let path = dir.path().join("9.tpl");
        let mut record: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let flipped = {
            let cipher = record["ciphertext"].as_array_mut().unwrap();
            let first = cipher[0].as_u64().unwrap() as u8 ^ 0xFF;
            cipher[0] = first.into();
            serde_json::to_string(&record).unwrap()
        };
        fs::write(&path, flipped).unwrap();

        assert!(matches!(store.get(UserId(9)), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_garbage_record_reads_corrupt() {
        let (dir, store) = store();
        fs::write(dir.path().join("5.tpl"), b"not json").unwrap();
        assert!(matches!(store.get(UserId(5)), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_put_overwrites_last_writer_wins() {
        let (_dir, store) = store();
        store.put(UserId(1), b"first").unwrap();
        store.put(UserId(1), b"second").unwrap();
        assert_eq!(store.get(UserId(1)).unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_delete_and_not_found() {
        let (_dir, store) = store();
        store.put(UserId(3), b"blob").unwrap();
        assert!(store.exists(UserId(3)));

        store.delete(UserId(3)).unwrap();
        assert!(!store.exists(UserId(3)));
        assert!(matches!(
            store.delete(UserId(3)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_skips_strays_and_sorts() {
        let (dir, store) = store();
        store.put(UserId(20), b"b").unwrap();
        store.put(UserId(4), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let profiles = store.list().unwrap();
        let users: Vec<u32> = profiles.iter().map(|p| p.user.0).collect();
        assert_eq!(users, vec![4, 20]);
        assert!(!profiles[0].created_at.is_empty());
    }

    #[test]
    fn test_key_survives_reopen() {
        let (dir, store) = store();
        store.put(UserId(8), b"blob").unwrap();
        drop(store);

        let reopened = FileTemplateStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(UserId(8)).unwrap(), Some(b"blob".to_vec()));
    }
}
