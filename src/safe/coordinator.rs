//! Signature collection and relay flow for one session
//!
//! Operator decisions (overwriting an existing signature, broadcasting a
//! signed transaction) go through a [`ConfirmationPort`]. Declining is a
//! normal outcome, not an error.

use alloy_primitives::{Address, Bytes, B256};
use std::fmt;

use super::aggregate::SignatureAggregator;
use super::session::SafeSession;
use super::SafeError;
use crate::crypto::Signature;
use crate::node::NodeClient;
use crate::signer::Signer;
use crate::storage::SignatureStore;
use crate::tx::{
    RelayPolicy, RelayTransactionSigner, SignedRelayTx, TransactionBuilder, UnsignedRelayTx,
};

/// Operator decisions
pub trait ConfirmationPort {
    /// `signer` already has `existing` stored; replace it?
    fn confirm_overwrite(&self, signer: Address, existing: &Signature) -> bool;

    fn confirm_broadcast(&self, tx: &SignedRelayTx, chain_id: u64) -> bool;
}

/// Collected signatures against the session threshold
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureProgress {
    pub signers: Vec<Address>,
    pub threshold: u64,
}

impl SignatureProgress {
    pub fn collected(&self) -> usize {
        self.signers.len()
    }

    pub fn is_complete(&self) -> bool {
        self.collected() as u64 >= self.threshold
    }
}

impl fmt::Display for SignatureProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} signatures are collected",
            self.collected(),
            self.threshold
        )?;
        if !self.signers.is_empty() {
            let signers: Vec<String> =
                self.signers.iter().map(|a| a.to_checksum(None)).collect();
            write!(f, ", from [{}]", signers.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignOutcome {
    /// A new signature was stored
    Stored(SignatureProgress),
    /// The operator kept the existing signature
    Kept,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Sent(B256),
    Declined,
}

/// Drives one session against a store
pub struct SafeCoordinator<'a> {
    session: &'a SafeSession,
    store: &'a mut dyn SignatureStore,
    confirm: &'a dyn ConfirmationPort,
}

impl<'a> SafeCoordinator<'a> {
    pub fn new(
        session: &'a SafeSession,
        store: &'a mut dyn SignatureStore,
        confirm: &'a dyn ConfirmationPort,
    ) -> Self {
        Self {
            session,
            store,
            confirm,
        }
    }

    pub fn session(&self) -> &SafeSession {
        self.session
    }

    pub fn progress(&self) -> SignatureProgress {
        let signers = SignatureAggregator::new(&*self.store)
            .ordered(&self.session.transaction_hash())
            .into_iter()
            .map(|(address, _)| address)
            .collect();
        SignatureProgress {
            signers,
            threshold: self.session.threshold(),
        }
    }

    /// Have `owner` sign the session message with `signer` and store it
    ///
    /// Nothing is written unless the signer's address check passes and the
    /// device returns a signature.
    pub fn collect_signature(
        &mut self,
        signer: &Signer,
        owner: Address,
    ) -> Result<SignOutcome, SafeError> {
        if !self.session.is_owner(owner) {
            return Err(SafeError::NotOwner(owner));
        }

        let tx_hash = self.session.transaction_hash();
        let existing = self.store.get(&tx_hash).get(&owner).copied();
        if let Some(existing) = &existing {
            if !self.confirm.confirm_overwrite(owner, existing) {
                log::info!("Keeping existing signature of {}", owner);
                return Ok(SignOutcome::Kept);
            }
        }

        let signature = signer.sign_message(owner, &self.session.typed_data())?;
        self.store
            .compare_and_put(tx_hash, owner, existing.as_ref(), signature)?;
        log::info!("Stored signature of {} for {}", owner, tx_hash);

        Ok(SignOutcome::Stored(self.progress()))
    }

    /// Aggregated signatures for the session message
    pub fn aggregate(&self) -> Result<Bytes, SafeError> {
        SignatureAggregator::new(&*self.store)
            .aggregate(&self.session.transaction_hash(), self.session.threshold())
    }

    pub fn unsigned_relay_tx(
        &self,
        node: &dyn NodeClient,
        relayer: Address,
        policy: &RelayPolicy,
    ) -> Result<UnsignedRelayTx, SafeError> {
        let signatures = self.aggregate()?;
        let tx = TransactionBuilder::new(self.session.address(), self.session.chain_id())
            .policy(policy)
            .build(node, self.session.message(), &signatures, relayer)?;
        Ok(tx)
    }

    pub fn signed_relay_tx(
        &self,
        node: &dyn NodeClient,
        signer: &Signer,
        relayer: Address,
        policy: &RelayPolicy,
    ) -> Result<SignedRelayTx, SafeError> {
        let tx = self.unsigned_relay_tx(node, relayer, policy)?;
        Ok(RelayTransactionSigner::new(signer, relayer).sign(&tx)?)
    }

    /// Submit `tx` once the operator confirms
    pub fn broadcast_relay_tx(
        &self,
        node: &dyn NodeClient,
        tx: &SignedRelayTx,
    ) -> Result<BroadcastOutcome, SafeError> {
        if !self.confirm.confirm_broadcast(tx, self.session.chain_id()) {
            log::info!("Broadcast of {} declined", tx.hash);
            return Ok(BroadcastOutcome::Declined);
        }

        let hash = node.send_raw_transaction(&tx.raw)?;
        log::info!("Transaction sent -- tx_hash: {}", hash);
        Ok(BroadcastOutcome::Sent(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{recover_address, KeyPair};
    use crate::node::testing::{FakeNode, FakeSafe};
    use crate::safe::{SafeTxParams, DEFAULT_SIGN_MAGIC};
    use crate::signer::testing::{FakeLedger, FakeLedgerConnector};
    use crate::signer::{LedgerSigner, LocalKeySigner, SignerError};
    use crate::storage::MemorySignatureStore;
    use crate::tx::{FeePolicy, GasPolicy};
    use alloy_primitives::U256;
    use std::cell::Cell;

    struct Answers {
        overwrite: bool,
        broadcast: bool,
        asked: Cell<usize>,
    }

    impl Answers {
        fn new(overwrite: bool, broadcast: bool) -> Self {
            Self {
                overwrite,
                broadcast,
                asked: Cell::new(0),
            }
        }
    }

    impl ConfirmationPort for Answers {
        fn confirm_overwrite(&self, _signer: Address, _existing: &Signature) -> bool {
            self.asked.set(self.asked.get() + 1);
            self.overwrite
        }

        fn confirm_broadcast(&self, _tx: &SignedRelayTx, _chain_id: u64) -> bool {
            self.asked.set(self.asked.get() + 1);
            self.broadcast
        }
    }

    struct Owners {
        a: KeyPair,
        b: KeyPair,
    }

    /// Two owners, `a` with the lower address
    fn owners() -> Owners {
        let first = KeyPair::from_private_key_hex(&"11".repeat(32)).unwrap();
        let second = KeyPair::from_private_key_hex(&"22".repeat(32)).unwrap();
        if first.address() < second.address() {
            Owners { a: first, b: second }
        } else {
            Owners { a: second, b: first }
        }
    }

    fn session(owners: &Owners, threshold: u64) -> SafeSession {
        let safe = FakeSafe {
            threshold,
            owners: vec![owners.a.address(), owners.b.address()],
            ..FakeSafe::sample()
        };
        let params = SafeTxParams::call(Address::repeat_byte(0x10), U256::from(1), Bytes::new());
        SafeSession::open(&safe, params, Bytes::from_static(&DEFAULT_SIGN_MAGIC)).unwrap()
    }

    fn local(key: &KeyPair) -> Signer {
        Signer::LocalKey(LocalKeySigner::new(key.clone()))
    }

    fn policy() -> RelayPolicy {
        RelayPolicy {
            gas: GasPolicy::fixed(150_000),
            fees: FeePolicy::new(0, 1_000_000_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_collect_in_reverse_order_aggregates_ascending() {
        let owners = owners();
        let session = session(&owners, 2);
        let mut store = MemorySignatureStore::new();
        let answers = Answers::new(true, true);
        let mut coordinator = SafeCoordinator::new(&session, &mut store, &answers);

        let first = coordinator
            .collect_signature(&local(&owners.b), owners.b.address())
            .unwrap();
        match first {
            SignOutcome::Stored(progress) => {
                assert_eq!(progress.collected(), 1);
                assert!(!progress.is_complete());
            }
            SignOutcome::Kept => panic!("nothing to keep"),
        }
        assert!(matches!(
            coordinator.aggregate(),
            Err(SafeError::InsufficientSignatures { have: 1, need: 2 })
        ));

        coordinator
            .collect_signature(&local(&owners.a), owners.a.address())
            .unwrap();
        let blob = coordinator.aggregate().unwrap();
        assert_eq!(blob.len(), 130);

        let digest = session.transaction_hash();
        let first = Signature::from_bytes(&blob[..65]).unwrap();
        let second = Signature::from_bytes(&blob[65..]).unwrap();
        assert_eq!(recover_address(&digest, &first).unwrap(), owners.a.address());
        assert_eq!(recover_address(&digest, &second).unwrap(), owners.b.address());
    }

    #[test]
    fn test_not_owner() {
        let owners = owners();
        let session = session(&owners, 1);
        let mut store = MemorySignatureStore::new();
        let answers = Answers::new(true, true);
        let mut coordinator = SafeCoordinator::new(&session, &mut store, &answers);

        let stranger = KeyPair::generate();
        let result = coordinator.collect_signature(&local(&stranger), stranger.address());
        assert!(matches!(result, Err(SafeError::NotOwner(a)) if a == stranger.address()));
        assert!(coordinator.progress().signers.is_empty());
    }

    #[test]
    fn test_address_mismatch_leaves_store_untouched() {
        let owners = owners();
        let session = session(&owners, 1);
        let mut store = MemorySignatureStore::new();
        let answers = Answers::new(true, true);
        let device = FakeLedger::new(Address::repeat_byte(0x99));
        let ledger = Signer::Ledger(LedgerSigner::new(
            Box::new(FakeLedgerConnector::new(device.clone())),
            0,
        ));

        let mut coordinator = SafeCoordinator::new(&session, &mut store, &answers);
        let result = coordinator.collect_signature(&ledger, owners.a.address());

        assert!(matches!(
            result,
            Err(SafeError::Signer(SignerError::AddressMismatch { .. }))
        ));
        assert_eq!(device.close_count(), 1);
        assert!(store.get(&session.transaction_hash()).is_empty());
    }

    #[test]
    fn test_overwrite_declined_keeps_signature() {
        let owners = owners();
        let session = session(&owners, 1);
        let tx_hash = session.transaction_hash();
        let placeholder = Signature::new(B256::repeat_byte(1), B256::repeat_byte(2), 27);

        let mut store = MemorySignatureStore::new();
        store.put(tx_hash, owners.a.address(), placeholder).unwrap();

        let answers = Answers::new(false, true);
        let mut coordinator = SafeCoordinator::new(&session, &mut store, &answers);
        let outcome = coordinator
            .collect_signature(&local(&owners.a), owners.a.address())
            .unwrap();

        assert_eq!(outcome, SignOutcome::Kept);
        assert_eq!(answers.asked.get(), 1);
        assert_eq!(store.get(&tx_hash)[&owners.a.address()], placeholder);
    }

    #[test]
    fn test_overwrite_confirmed_replaces_signature() {
        let owners = owners();
        let session = session(&owners, 1);
        let tx_hash = session.transaction_hash();
        let placeholder = Signature::new(B256::repeat_byte(1), B256::repeat_byte(2), 27);

        let mut store = MemorySignatureStore::new();
        store.put(tx_hash, owners.a.address(), placeholder).unwrap();

        let answers = Answers::new(true, true);
        let mut coordinator = SafeCoordinator::new(&session, &mut store, &answers);
        coordinator
            .collect_signature(&local(&owners.a), owners.a.address())
            .unwrap();

        let stored = store.get(&tx_hash)[&owners.a.address()];
        assert_ne!(stored, placeholder);
        assert_eq!(recover_address(&tx_hash, &stored).unwrap(), owners.a.address());
    }

    #[test]
    fn test_relay_flow_and_broadcast() {
        let owners = owners();
        let session = session(&owners, 1);
        let mut store = MemorySignatureStore::new();
        let answers = Answers::new(true, true);
        let node = FakeNode {
            transaction_count: 3,
            gas_price: 20_000_000_000,
            ..Default::default()
        };
        let relayer = KeyPair::generate();

        let mut coordinator = SafeCoordinator::new(&session, &mut store, &answers);
        coordinator
            .collect_signature(&local(&owners.a), owners.a.address())
            .unwrap();

        let unsigned = coordinator
            .unsigned_relay_tx(&node, relayer.address(), &policy())
            .unwrap();
        assert_eq!(unsigned.nonce, 3);
        assert_eq!(unsigned.gas, 150_000);
        assert_eq!(unsigned.max_fee_per_gas, 21_000_000_000);
        assert_eq!(unsigned.to, session.address());
        assert_eq!(unsigned.chain_id, 1);

        let signed = coordinator
            .signed_relay_tx(&node, &local(&relayer), relayer.address(), &policy())
            .unwrap();
        let outcome = coordinator.broadcast_relay_tx(&node, &signed).unwrap();

        assert_eq!(outcome, BroadcastOutcome::Sent(signed.hash));
        assert_eq!(node.sent.borrow().as_slice(), &[signed.raw.clone()]);
    }

    #[test]
    fn test_broadcast_declined_sends_nothing() {
        let owners = owners();
        let session = session(&owners, 1);
        let mut store = MemorySignatureStore::new();
        let answers = Answers::new(true, false);
        let node = FakeNode::default();
        let relayer = KeyPair::generate();

        let mut coordinator = SafeCoordinator::new(&session, &mut store, &answers);
        coordinator
            .collect_signature(&local(&owners.a), owners.a.address())
            .unwrap();
        let signed = coordinator
            .signed_relay_tx(&node, &local(&relayer), relayer.address(), &policy())
            .unwrap();

        let outcome = coordinator.broadcast_relay_tx(&node, &signed).unwrap();
        assert_eq!(outcome, BroadcastOutcome::Declined);
        assert!(node.sent.borrow().is_empty());
    }

    #[test]
    fn test_relay_below_threshold() {
        let owners = owners();
        let session = session(&owners, 2);
        let mut store = MemorySignatureStore::new();
        let answers = Answers::new(true, true);
        let node = FakeNode::default();

        let coordinator = SafeCoordinator::new(&session, &mut store, &answers);
        assert!(matches!(
            coordinator.unsigned_relay_tx(&node, Address::repeat_byte(1), &policy()),
            Err(SafeError::InsufficientSignatures { have: 0, need: 2 })
        ));
        assert_eq!(node.estimate_calls.get(), 0);
    }
}
