//! CLI commands for collecting signatures and relaying
//!
//! Implements all command handlers for the CLI interface.

use crate::config::{AccountEntry, Config, SignerEntry, WalletKind};
use crate::crypto::Signature;
use crate::node::{JsonRpcClient, RpcSafeAccount};
use crate::safe::{
    BroadcastOutcome, ConfirmationPort, SafeCoordinator, SafeSession, SignOutcome,
};
use crate::signer::{
    ApduConnector, LedgerSigner, LocalKeySigner, Signer, SignerError, TcpApduConnector,
    TrezorConnector, TrezorSigner,
};
use crate::storage::{FileSignatureStore, DEFAULT_SIGNATURES_FILE};
use crate::tx::SignedRelayTx;
use alloy_primitives::Address;
use dialoguer::Confirm;
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Environment variable with the address of the Ledger APDU endpoint
pub const LEDGER_PROXY_ENV: &str = "LEDGER_PROXY_ADDRESS";

/// Application state
pub struct AppState {
    pub config: Config,
    pub safe: AccountEntry,
    pub client: JsonRpcClient,
    pub session: SafeSession,
    pub store: FileSignatureStore,
}

impl AppState {
    /// Load the config, open a session for the chosen account and load its store
    pub fn new(
        config_path: &Path,
        safe: Option<&str>,
        store_path: Option<PathBuf>,
    ) -> CliResult<Self> {
        let config = Config::load(config_path)?;
        let safe = match safe {
            Some(key) => config.safe(key)?.clone(),
            None => config
                .safes
                .first()
                .cloned()
                .ok_or("no safes configured")?,
        };

        let client = JsonRpcClient::new(config.rpc_url()?)?;
        let account = RpcSafeAccount::new(client.clone(), safe.address);

        println!("🔐 Safe {} ({})", safe.name, safe.address);
        let session = SafeSession::open(
            &account,
            config.safe_tx_params()?,
            config.constants.sign_magic.clone(),
        )?;

        let store_path = store_path.unwrap_or_else(|| default_store_path(config_path));
        let store = FileSignatureStore::open(store_path);

        Ok(Self {
            config,
            safe,
            client,
            session,
            store,
        })
    }

    fn coordinator<'a>(&'a mut self, confirm: &'a dyn ConfirmationPort) -> SafeCoordinator<'a> {
        SafeCoordinator::new(&self.session, &mut self.store, confirm)
    }
}

/// `signatures.json` next to the config file
pub fn default_store_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|dir| dir.join(DEFAULT_SIGNATURES_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SIGNATURES_FILE))
}

/// Operator prompts on the terminal
pub struct TerminalConfirm;

impl TerminalConfirm {
    fn ask(prompt: String) -> bool {
        match Confirm::new().with_prompt(prompt).default(false).interact() {
            Ok(answer) => answer,
            Err(e) => {
                log::warn!("Prompt failed, treating as no: {}", e);
                false
            }
        }
    }
}

impl ConfirmationPort for TerminalConfirm {
    fn confirm_overwrite(&self, signer: Address, _existing: &Signature) -> bool {
        Self::ask(format!(
            "Signature for signer {} already exists, overwrite it?",
            signer
        ))
    }

    fn confirm_broadcast(&self, tx: &SignedRelayTx, chain_id: u64) -> bool {
        Self::ask(format!(
            "Confirm you want to broadcast {} on chain {}",
            tx.hash, chain_id
        ))
    }
}

/// Ledger channel: the TCP endpoint when one is configured, USB otherwise
fn ledger_connector() -> Box<dyn ApduConnector> {
    if let Ok(address) = std::env::var(LEDGER_PROXY_ENV) {
        log::debug!("Using Ledger endpoint {}", address);
        return Box::new(TcpApduConnector::new(address));
    }
    #[cfg(feature = "ledger-hid")]
    {
        Box::new(crate::signer::HidApduConnector)
    }
    #[cfg(not(feature = "ledger-hid"))]
    {
        Box::new(TcpApduConnector::default())
    }
}

fn trezor_connector() -> Box<dyn TrezorConnector> {
    #[cfg(feature = "trezor-usb")]
    {
        Box::new(crate::signer::TrezorUsbConnector)
    }
    #[cfg(not(feature = "trezor-usb"))]
    {
        Box::new(crate::signer::DisconnectedTrezor)
    }
}

/// Build the signer backend for a configured signer or relayer
pub fn open_signer(entry: &SignerEntry) -> Result<Signer, SignerError> {
    let index = || {
        entry
            .index
            .ok_or_else(|| SignerError::InvalidPath(format!("{} has no index", entry.name)))
    };

    let signer = match entry.wallet {
        WalletKind::Hot => {
            let key_name = entry
                .key_name
                .as_deref()
                .ok_or_else(|| SignerError::MissingKey(entry.name.clone()))?;
            Signer::LocalKey(LocalKeySigner::from_env(key_name)?)
        }
        WalletKind::Ledger => Signer::Ledger(LedgerSigner::new(ledger_connector(), index()?)),
        WalletKind::TrezorOne => {
            Signer::TrezorOne(TrezorSigner::new(trezor_connector(), index()?))
        }
        WalletKind::TrezorT => Signer::TrezorT(TrezorSigner::new(trezor_connector(), index()?)),
    };
    Ok(signer)
}

/// Ask the operator to plug in and unlock a hardware wallet
fn prompt_device(role: &str, entry: &SignerEntry) -> bool {
    if !entry.wallet.is_hardware() {
        return true;
    }
    TerminalConfirm::ask(format!(
        "{} {} ({}), connect your {} and open the wallet at index {}. Continue?",
        role,
        entry.name,
        entry.address,
        entry.wallet,
        entry.index.unwrap_or_default()
    ))
}

/// Show the session hashes and collection progress
pub fn cmd_hash(state: &mut AppState) -> CliResult<()> {
    let session = &state.session;
    println!("📋 Transaction for {}", state.safe.name);
    println!("   ├─ Chain ID: {}", session.chain_id());
    println!("   ├─ Nonce: {}", session.message().nonce);
    println!("   ├─ To: {}", session.message().to);
    println!("   ├─ Operation: {}", session.message().operation);
    println!("   ├─ Domain hash: {}", session.domain_hash());
    println!("   ├─ Message hash: {}", session.message_hash());
    println!("   └─ Transaction hash: {}", session.transaction_hash());

    let progress = state.coordinator(&TerminalConfirm).progress();
    println!("\n✍️  {}", progress);
    Ok(())
}

/// Print the EIP-712 document the owners sign
pub fn cmd_typed_data(state: &mut AppState) -> CliResult<()> {
    let doc = state.session.typed_data().to_json();
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

/// Validate the config file without contacting a node
pub fn cmd_check_config(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    println!("✅ Config is valid");
    println!("   📁 File: {:?}", config_path);
    println!("   ├─ Safes: {}", config.safes.len());
    for safe in &config.safes {
        println!("   │   {} ({})", safe.name, safe.address);
    }
    println!("   ├─ Signers: {}", config.signers.len());
    for signer in &config.signers {
        println!("   │   {} ({}) [{}]", signer.name, signer.address, signer.wallet);
    }
    println!("   ├─ Relayers: {}", config.relayers.len());
    for relayer in &config.relayers {
        println!("   │   {} ({}) [{}]", relayer.name, relayer.address, relayer.wallet);
    }
    println!("   └─ Operation: {}", config.operation()?);
    if config.rpc_url().is_err() {
        println!("⚠️  No rpc_url in config and {} is unset", crate::config::RPC_URL_ENV);
    }
    Ok(())
}

/// Collect one owner's signature
pub fn cmd_sign(state: &mut AppState, signer_key: &str) -> CliResult<()> {
    let entry = state.config.signer(signer_key)?.clone();

    let account = RpcSafeAccount::new(state.client.clone(), state.safe.address);
    if !state.session.owner_on_chain(&account, entry.address)? {
        println!("⚠️  {} is not an owner of {} on chain", entry.name, state.safe.name);
    }

    if !prompt_device("Signer", &entry) {
        println!("↩️  Signing cancelled");
        return Ok(());
    }

    let signer = open_signer(&entry)?;
    let mut coordinator = state.coordinator(&TerminalConfirm);
    match coordinator.collect_signature(&signer, entry.address)? {
        SignOutcome::Stored(progress) => {
            println!("✅ Signature of {} stored", entry.name);
            println!("   {}", progress);
            if progress.is_complete() {
                println!("   🎉 Threshold reached, ready to relay");
            }
        }
        SignOutcome::Kept => {
            println!("↩️  Existing signature of {} kept", entry.name);
        }
    }
    Ok(())
}

/// Print the unsigned relay transaction
pub fn cmd_unsigned_tx(state: &mut AppState, relayer_key: &str) -> CliResult<()> {
    let entry = state.config.relayer(relayer_key)?.clone();
    let policy = state.config.relay_policy();
    let client = state.client.clone();

    let coordinator = state.coordinator(&TerminalConfirm);
    let tx = coordinator.unsigned_relay_tx(&client, entry.address, &policy)?;

    println!("📝 Unsigned relay transaction from {} ({})", entry.name, entry.address);
    println!("{}", tx);
    Ok(())
}

fn sign_relay_tx(state: &mut AppState, entry: &SignerEntry) -> CliResult<Option<SignedRelayTx>> {
    if !prompt_device("Relayer", entry) {
        println!("↩️  Signing cancelled");
        return Ok(None);
    }

    let signer = open_signer(entry)?;
    let policy = state.config.relay_policy();
    let client = state.client.clone();

    let coordinator = state.coordinator(&TerminalConfirm);
    let signed = coordinator.signed_relay_tx(&client, &signer, entry.address, &policy)?;

    println!("🖊️  Signed relay transaction");
    println!("   ├─ Hash: {}", signed.hash);
    println!("   └─ Raw: {}", signed.raw);
    Ok(Some(signed))
}

/// Sign the relay transaction and print it without sending
pub fn cmd_signed_tx(state: &mut AppState, relayer_key: &str) -> CliResult<()> {
    let entry = state.config.relayer(relayer_key)?.clone();
    sign_relay_tx(state, &entry)?;
    Ok(())
}

/// Sign the relay transaction and broadcast it after confirmation
pub fn cmd_broadcast(state: &mut AppState, relayer_key: &str) -> CliResult<()> {
    let entry = state.config.relayer(relayer_key)?.clone();
    let Some(signed) = sign_relay_tx(state, &entry)? else {
        return Ok(());
    };

    let client = state.client.clone();
    let coordinator = state.coordinator(&TerminalConfirm);
    match coordinator.broadcast_relay_tx(&client, &signed)? {
        BroadcastOutcome::Sent(hash) => {
            println!("📤 Transaction sent -- tx_hash: {}", hash);
        }
        BroadcastOutcome::Declined => {
            println!("↩️  Broadcast cancelled");
        }
    }
    Ok(())
}
