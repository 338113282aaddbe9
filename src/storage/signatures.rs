//! Signature store persistence
//!
//! Maps transaction hash -> signer address -> signature. The file form is a
//! flat two-level JSON document of hex strings:
//!
//! ```json
//! { "<tx hash>": { "<checksummed address>": "<65-byte signature>" } }
//! ```
//!
//! A missing or unparsable document loads as an empty store. The document
//! is rewritten in full after every mutation.

use alloy_primitives::{Address, B256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::crypto::Signature;

/// Default file name of the persisted store
pub const DEFAULT_SIGNATURES_FILE: &str = "signatures.json";

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Signature of {address} for {tx_hash} changed concurrently")]
    Conflict { tx_hash: B256, address: Address },
}

/// On-disk representation, sorted for stable output
type SignatureDocument = BTreeMap<String, BTreeMap<String, String>>;

/// Store of owner signatures, keyed by transaction hash
///
/// At most one signature exists per (transaction hash, address) pair.
/// Overwrite policy is the caller's decision; `put` never asks.
pub trait SignatureStore {
    /// All signatures collected for `tx_hash`; empty when none exist
    fn get(&self, tx_hash: &B256) -> HashMap<Address, Signature>;

    /// Unconditional upsert
    fn put(&mut self, tx_hash: B256, address: Address, signature: Signature)
        -> Result<(), StoreError>;

    /// Upsert only if the current entry still equals `expected`
    ///
    /// Fails with [`StoreError::Conflict`] otherwise, leaving the store
    /// untouched. `expected == None` means "no signature stored yet".
    fn compare_and_put(
        &mut self,
        tx_hash: B256,
        address: Address,
        expected: Option<&Signature>,
        signature: Signature,
    ) -> Result<(), StoreError>;
}

/// In-memory contents shared by the store implementations
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureBook {
    entries: HashMap<B256, HashMap<Address, Signature>>,
}

impl SignatureBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tx_hash: &B256) -> HashMap<Address, Signature> {
        self.entries.get(tx_hash).cloned().unwrap_or_default()
    }

    pub fn signature(&self, tx_hash: &B256, address: &Address) -> Option<&Signature> {
        self.entries.get(tx_hash).and_then(|sigs| sigs.get(address))
    }

    pub fn insert(&mut self, tx_hash: B256, address: Address, signature: Signature) {
        self.entries
            .entry(tx_hash)
            .or_default()
            .insert(address, signature);
    }

    fn check_expected(
        &self,
        tx_hash: &B256,
        address: &Address,
        expected: Option<&Signature>,
    ) -> Result<(), StoreError> {
        if self.signature(tx_hash, address) != expected {
            return Err(StoreError::Conflict {
                tx_hash: *tx_hash,
                address: *address,
            });
        }
        Ok(())
    }

    /// Number of transaction hashes with at least one signature
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_document(&self) -> SignatureDocument {
        self.entries
            .iter()
            .map(|(tx_hash, sigs)| {
                let inner = sigs
                    .iter()
                    .map(|(address, sig)| (address.to_checksum(None), sig.to_hex()))
                    .collect();
                (hex::encode(tx_hash.as_slice()), inner)
            })
            .collect()
    }

    fn from_document(doc: SignatureDocument) -> Result<Self, StoreError> {
        let mut book = Self::new();
        for (tx_hash, sigs) in doc {
            let tx_hash = B256::from_str(&tx_hash)
                .map_err(|e| StoreError::InvalidData(format!("transaction hash {}: {}", tx_hash, e)))?;
            for (address, sig) in sigs {
                let address = Address::from_str(&address)
                    .map_err(|e| StoreError::InvalidData(format!("address {}: {}", address, e)))?;
                let sig = Signature::from_hex(&sig)
                    .map_err(|e| StoreError::InvalidData(format!("signature of {}: {}", address, e)))?;
                book.insert(tx_hash, address, sig);
            }
        }
        Ok(book)
    }

    /// Serialize to the document format
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Parse the document format
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let doc: SignatureDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }
}

/// Non-persistent store
#[derive(Debug, Default)]
pub struct MemorySignatureStore {
    book: SignatureBook,
}

impl MemorySignatureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignatureStore for MemorySignatureStore {
    fn get(&self, tx_hash: &B256) -> HashMap<Address, Signature> {
        self.book.get(tx_hash)
    }

    fn put(
        &mut self,
        tx_hash: B256,
        address: Address,
        signature: Signature,
    ) -> Result<(), StoreError> {
        self.book.insert(tx_hash, address, signature);
        Ok(())
    }

    fn compare_and_put(
        &mut self,
        tx_hash: B256,
        address: Address,
        expected: Option<&Signature>,
        signature: Signature,
    ) -> Result<(), StoreError> {
        self.book.check_expected(&tx_hash, &address, expected)?;
        self.book.insert(tx_hash, address, signature);
        Ok(())
    }
}

/// Store persisted as a JSON document
///
/// Every mutation re-reads the file, applies the change on top of what is on
/// disk and writes the result through a temporary file and an atomic rename.
/// Single-writer use is assumed; there is no file locking.
#[derive(Debug)]
pub struct FileSignatureStore {
    path: PathBuf,
    book: SignatureBook,
}

impl FileSignatureStore {
    /// Open the store at `path`, degrading to empty on missing or corrupt data
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let book = match Self::read(&path) {
            Ok(Some(book)) => {
                log::debug!("Loaded {} transaction(s) from {:?}", book.len(), path);
                book
            }
            Ok(None) => {
                log::info!("No signature file at {:?}, starting empty", path);
                SignatureBook::new()
            }
            Err(e) => {
                log::warn!("Ignoring unreadable signature file {:?}: {}", path, e);
                SignatureBook::new()
            }
        };
        Self { path, book }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn book(&self) -> &SignatureBook {
        &self.book
    }

    fn read(path: &Path) -> Result<Option<SignatureBook>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let file = fs::File::open(path)?;
        let doc: SignatureDocument = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(SignatureBook::from_document(doc)?))
    }

    /// Refresh from disk before a mutation; keep memory if the file is unusable
    fn reload(&mut self) {
        match Self::read(&self.path) {
            Ok(Some(book)) => self.book = book,
            Ok(None) => {}
            Err(e) => log::warn!("Keeping in-memory signatures, file unreadable: {}", e),
        }
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to temporary file first
        let mut temp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_SIGNATURES_FILE.into());
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.book.to_document())?;
        writer.flush()?;

        // Atomic rename
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl SignatureStore for FileSignatureStore {
    fn get(&self, tx_hash: &B256) -> HashMap<Address, Signature> {
        self.book.get(tx_hash)
    }

    fn put(
        &mut self,
        tx_hash: B256,
        address: Address,
        signature: Signature,
    ) -> Result<(), StoreError> {
        self.reload();
        self.book.insert(tx_hash, address, signature);
        self.save()
    }

    fn compare_and_put(
        &mut self,
        tx_hash: B256,
        address: Address,
        expected: Option<&Signature>,
        signature: Signature,
    ) -> Result<(), StoreError> {
        self.reload();
        self.book.check_expected(&tx_hash, &address, expected)?;
        self.book.insert(tx_hash, address, signature);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(byte: u8) -> Signature {
        Signature::new(B256::repeat_byte(byte), B256::repeat_byte(byte), 27)
    }

    #[test]
    fn test_get_absent_is_empty() {
        let store = MemorySignatureStore::new();
        assert!(store.get(&B256::repeat_byte(1)).is_empty());
    }

    #[test]
    fn test_put_twice_keeps_latest() {
        let mut store = MemorySignatureStore::new();
        let tx = B256::repeat_byte(1);
        let owner = Address::repeat_byte(0xaa);

        store.put(tx, owner, sig(1)).unwrap();
        store.put(tx, owner, sig(2)).unwrap();

        let sigs = store.get(&tx);
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[&owner], sig(2));
    }

    #[test]
    fn test_compare_and_put_conflict() {
        let mut store = MemorySignatureStore::new();
        let tx = B256::repeat_byte(1);
        let owner = Address::repeat_byte(0xaa);

        store.compare_and_put(tx, owner, None, sig(1)).unwrap();

        // Stale expectation: nothing stored
        let result = store.compare_and_put(tx, owner, None, sig(2));
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(store.get(&tx)[&owner], sig(1));

        // Correct expectation
        store.compare_and_put(tx, owner, Some(&sig(1)), sig(3)).unwrap();
        assert_eq!(store.get(&tx)[&owner], sig(3));
    }

    #[test]
    fn test_file_store_persists_and_reloads() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(DEFAULT_SIGNATURES_FILE);
        let tx = B256::repeat_byte(7);

        let mut store = FileSignatureStore::open(&path);
        store.put(tx, Address::repeat_byte(0xbb), sig(2)).unwrap();
        store.put(tx, Address::repeat_byte(0xaa), sig(1)).unwrap();
        assert!(path.exists());

        let reopened = FileSignatureStore::open(&path);
        let sigs = reopened.get(&tx);
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[&Address::repeat_byte(0xaa)], sig(1));
        assert_eq!(sigs[&Address::repeat_byte(0xbb)], sig(2));
    }

    #[test]
    fn test_document_format() {
        let mut book = SignatureBook::new();
        let owner = Address::repeat_byte(0xaa);
        book.insert(B256::repeat_byte(0x01), owner, sig(0x11));

        let doc: serde_json::Value = serde_json::from_str(&book.to_json().unwrap()).unwrap();
        let inner = &doc["01".repeat(32)];
        assert_eq!(inner[owner.to_checksum(None)], sig(0x11).to_hex());
    }

    #[test]
    fn test_document_accepts_prefixed_hex() {
        let json = format!(
            r#"{{"0x{}": {{"0x{}": "0x{}"}}}}"#,
            "01".repeat(32),
            "aa".repeat(20),
            sig(5).to_hex()
        );
        let book = SignatureBook::from_json(&json).unwrap();
        assert_eq!(
            book.signature(&B256::repeat_byte(1), &Address::repeat_byte(0xaa)),
            Some(&sig(5))
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileSignatureStore::open(temp_dir.path().join("absent.json"));
        assert!(store.book().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(DEFAULT_SIGNATURES_FILE);
        fs::write(&path, "{ not json").unwrap();

        let store = FileSignatureStore::open(&path);
        assert!(store.book().is_empty());

        // Invalid signature length counts as corrupt too
        fs::write(&path, r#"{"ab": {"0xaa": "00"}}"#).unwrap();
        let store = FileSignatureStore::open(&path);
        assert!(store.book().is_empty());
    }

    #[test]
    fn test_file_store_sees_external_writes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(DEFAULT_SIGNATURES_FILE);
        let tx = B256::repeat_byte(3);
        let owner = Address::repeat_byte(0xaa);

        let mut first = FileSignatureStore::open(&path);
        let mut second = FileSignatureStore::open(&path);

        first.compare_and_put(tx, owner, None, sig(1)).unwrap();

        // The second handle loaded before the write and must not clobber it
        let result = second.compare_and_put(tx, owner, None, sig(2));
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(FileSignatureStore::open(&path).get(&tx)[&owner], sig(1));
    }
}
