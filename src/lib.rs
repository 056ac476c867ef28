//! Secret Custody Core — a local, single-user wallet's key-custody
//! subsystem: BIP39 mnemonic codec, BIP32/44 HD derivation, a
//! password-and-machine-bound AEAD seed vault, and identity/session/TOTP
//! gating around Bitcoin and Ethereum transaction signing.
//!
//! This crate has no network listener and no CLI front-end of its own — it
//! is consumed as a library by an out-of-scope GUI/CLI and an
//! out-of-scope block-explorer client. See `scc::SecretCustodyCore` for the
//! entry point that wires every component together, or the individual
//! modules below to use a piece (e.g. just the BIP39 codec) standalone.

pub mod bip39;
pub mod common;
pub mod config;
pub mod hdkey;
pub mod identity;
pub mod logging;
pub mod primitives;
pub mod scc;
pub mod signing;
pub mod storage;
pub mod vault;

pub use common::error::{Result, SccError};
pub use config::SccConfig;
pub use scc::{
    BroadcastClient, Chain, DerivedAddress, LoginResult, MachineFactorProvider, RegisterResult,
    RevealSeedResult, SecretCustodyCore, StaticMachineFactor, TotpEnrollment,
};
