//! Per-transaction session context
//!
//! A session pins everything the signing flow reads from the account:
//! chain id, threshold, owners, nonce and domain separator are fetched once
//! when the session opens and never refreshed. If the owner set or threshold
//! changes on chain while signatures are being collected, validation and
//! aggregation keep using the values seen at open time.

use alloy_primitives::{Address, Bytes, B256};

use super::hashing::{domain_hash, message_hash, transaction_hash};
use super::message::{SafeMessage, SafeTxParams};
use super::typed_data::SafeTypedData;
use super::SafeError;
use crate::node::SafeAccount;

#[derive(Clone, Debug)]
pub struct SafeSession {
    address: Address,
    chain_id: u64,
    threshold: u64,
    owners: Vec<Address>,
    domain_hash: B256,
    sign_magic: Bytes,
    message: SafeMessage,
    message_hash: B256,
    transaction_hash: B256,
}

impl SafeSession {
    /// Fetch account state and derive the hashes for `params`
    ///
    /// The domain hash is the separator reported by the contract; a local
    /// derivation that disagrees with it is logged as a warning.
    pub fn open(
        account: &dyn SafeAccount,
        params: SafeTxParams,
        sign_magic: Bytes,
    ) -> Result<Self, SafeError> {
        if sign_magic.is_empty() {
            return Err(SafeError::Validation("sign magic must not be empty".to_string()));
        }

        let address = account.address();
        let chain_id = account.chain_id()?;
        let threshold = account.threshold()?;
        let owners = account.owners()?;
        let nonce = account.nonce()?;
        let on_chain_domain = account.domain_separator()?;

        let local_domain = domain_hash(chain_id, address);
        if local_domain != on_chain_domain {
            log::warn!(
                "Domain separator of {} is {} on chain, derived {}",
                address,
                on_chain_domain,
                local_domain
            );
        }

        let message = params.with_nonce(nonce);
        let message_hash = message_hash(&message);
        let transaction_hash = transaction_hash(&sign_magic, &on_chain_domain, &message_hash);

        log::info!("Domain hash is: {}", on_chain_domain);
        log::info!("Message hash is: {}", message_hash);
        log::info!("Transaction hash is: {}", transaction_hash);
        log::debug!(
            "Session pinned threshold {} and {} owner(s) at nonce {}",
            threshold,
            owners.len(),
            nonce
        );

        Ok(Self {
            address,
            chain_id,
            threshold,
            owners,
            domain_hash: on_chain_domain,
            sign_magic,
            message,
            message_hash,
            transaction_hash,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    /// Ownership as of session open
    pub fn is_owner(&self, address: Address) -> bool {
        self.owners.contains(&address)
    }

    /// Ownership as the account reports it now
    ///
    /// Validation and aggregation still use the pinned owner list; a live
    /// answer that disagrees with it is only logged.
    pub fn owner_on_chain(
        &self,
        account: &dyn SafeAccount,
        address: Address,
    ) -> Result<bool, SafeError> {
        let live = account.is_owner(address)?;
        let pinned = self.is_owner(address);
        if live != pinned {
            log::warn!(
                "Owners of {} changed since the session opened: {} owner on chain {}, pinned {}",
                self.address,
                address,
                live,
                pinned
            );
        }
        Ok(live)
    }

    pub fn domain_hash(&self) -> B256 {
        self.domain_hash
    }

    pub fn sign_magic(&self) -> &Bytes {
        &self.sign_magic
    }

    pub fn message(&self) -> &SafeMessage {
        &self.message
    }

    pub fn message_hash(&self) -> B256 {
        self.message_hash
    }

    /// Key under which signatures for this message are stored
    pub fn transaction_hash(&self) -> B256 {
        self.transaction_hash
    }

    /// The message as a typed-data document for full-message signers
    pub fn typed_data(&self) -> SafeTypedData {
        SafeTypedData::new(self.message.clone(), self.chain_id, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::FakeSafe;
    use crate::safe::hashing::DEFAULT_SIGN_MAGIC;
    use alloy_primitives::{address, b256, U256};

    fn fake_safe() -> FakeSafe {
        let address = address!("1234567890123456789012345678901234567890");
        FakeSafe {
            address,
            domain_separator: domain_hash(1, address),
            ..FakeSafe::sample()
        }
    }

    fn params() -> SafeTxParams {
        SafeTxParams::call(
            address!("2c7536E3605D9C16a7a3D7b1898e529396a65c23"),
            U256::ZERO,
            Bytes::new(),
        )
    }

    #[test]
    fn test_open_derives_hashes() {
        let session =
            SafeSession::open(&fake_safe(), params(), Bytes::from_static(&DEFAULT_SIGN_MAGIC))
                .unwrap();

        assert_eq!(session.message().nonce, U256::from(7));
        assert_eq!(
            session.message_hash(),
            b256!("02e68236b9be9b7df38950b8f8fc447e1591b3e6dadbd3394cab69a180cbef80")
        );
        assert_eq!(
            session.domain_hash(),
            b256!("3888d34b69042fc92d822804722836d705e22c56efd96e8e04c0de3ec131831b")
        );
        assert_eq!(
            session.transaction_hash(),
            b256!("bc2fa793483994f3ef8b45f9587212d7dc31bd256ac973dc69cbe3d996b1366f")
        );
        assert_eq!(session.typed_data().signing_hash(), session.transaction_hash());
        assert_eq!(session.threshold(), 2);
        assert!(session.is_owner(Address::repeat_byte(0xaa)));
        assert!(!session.is_owner(Address::repeat_byte(0xcc)));
    }

    #[test]
    fn test_prefix_changes_transaction_hash_only() {
        let standard =
            SafeSession::open(&fake_safe(), params(), Bytes::from_static(&DEFAULT_SIGN_MAGIC))
                .unwrap();
        let custom =
            SafeSession::open(&fake_safe(), params(), Bytes::from_static(&[0x19, 0x00])).unwrap();

        assert_eq!(standard.message_hash(), custom.message_hash());
        assert_eq!(standard.domain_hash(), custom.domain_hash());
        assert_ne!(standard.transaction_hash(), custom.transaction_hash());
    }

    #[test]
    fn test_on_chain_domain_wins() {
        let mut safe = fake_safe();
        safe.domain_separator = B256::repeat_byte(0x42);

        let session =
            SafeSession::open(&safe, params(), Bytes::from_static(&DEFAULT_SIGN_MAGIC)).unwrap();
        assert_eq!(session.domain_hash(), B256::repeat_byte(0x42));
    }

    #[test]
    fn test_owner_on_chain_does_not_change_pinned_owners() {
        let safe = fake_safe();
        let session =
            SafeSession::open(&safe, params(), Bytes::from_static(&DEFAULT_SIGN_MAGIC)).unwrap();

        // 0xaa removed and 0xcc added after the session opened
        let changed = FakeSafe {
            owners: vec![Address::repeat_byte(0xbb), Address::repeat_byte(0xcc)],
            ..fake_safe()
        };

        assert!(!session.owner_on_chain(&changed, Address::repeat_byte(0xaa)).unwrap());
        assert!(session.owner_on_chain(&changed, Address::repeat_byte(0xcc)).unwrap());
        assert!(session.owner_on_chain(&safe, Address::repeat_byte(0xaa)).unwrap());
        assert!(session.is_owner(Address::repeat_byte(0xaa)));
        assert!(!session.is_owner(Address::repeat_byte(0xcc)));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        assert!(matches!(
            SafeSession::open(&fake_safe(), params(), Bytes::new()),
            Err(SafeError::Validation(_))
        ));
    }
}
