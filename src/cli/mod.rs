//! Command-line interface

pub mod commands;

pub use commands::{
    cmd_broadcast, cmd_check_config, cmd_hash, cmd_sign, cmd_signed_tx, cmd_typed_data,
    cmd_unsigned_tx, default_store_path, open_signer, AppState, CliResult, TerminalConfirm,
};
