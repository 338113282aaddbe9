//! Storage module for collected signatures

pub mod signatures;

pub use signatures::{
    FileSignatureStore, MemorySignatureStore, SignatureBook, SignatureStore, StoreError,
    DEFAULT_SIGNATURES_FILE,
};
