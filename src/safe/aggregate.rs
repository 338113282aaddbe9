//! Threshold signature aggregation
//!
//! The account contract recovers one signer per 65-byte chunk and requires
//! the recovered addresses to be strictly increasing, so the blob is always
//! ordered by ascending signer address, whatever order signatures arrived in.

use alloy_primitives::{Address, Bytes, B256};

use super::SafeError;
use crate::crypto::{Signature, SIGNATURE_LENGTH};
use crate::storage::SignatureStore;

pub struct SignatureAggregator<'a> {
    store: &'a dyn SignatureStore,
}

impl<'a> SignatureAggregator<'a> {
    pub fn new(store: &'a dyn SignatureStore) -> Self {
        Self { store }
    }

    /// Collected signatures for `tx_hash`, ascending by address
    pub fn ordered(&self, tx_hash: &B256) -> Vec<(Address, Signature)> {
        let mut entries: Vec<_> = self.store.get(tx_hash).into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    /// Concatenated signatures, failing below `threshold`
    pub fn aggregate(&self, tx_hash: &B256, threshold: u64) -> Result<Bytes, SafeError> {
        let entries = self.ordered(tx_hash);
        if (entries.len() as u64) < threshold {
            return Err(SafeError::InsufficientSignatures {
                have: entries.len(),
                need: threshold,
            });
        }

        let mut blob = Vec::with_capacity(entries.len() * SIGNATURE_LENGTH);
        for (_, signature) in &entries {
            blob.extend_from_slice(&signature.to_bytes());
        }

        log::info!(
            "Aggregated {} signature(s) for {} (threshold {})",
            entries.len(),
            tx_hash,
            threshold
        );
        Ok(Bytes::from(blob))
    }
}
