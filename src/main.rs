//! `scc-demo` — exercises the Secret Custody Core's public operations end
//! to end: register, login, reveal the mnemonic back out, derive a Bitcoin
//! and an Ethereum address, and sign a minimal transaction on each chain.
//!
//! This binary plays the role the GUI/CLI would in a full wallet; the core
//! itself has no front-end or network listener of its own.
//!
//! Run modes:
//!   cargo run                 - run the full demo walkthrough against an
//!                               in-memory store
//!   cargo run -- sqlite <path> - same walkthrough against a sqlite file

use std::env;
use std::sync::Arc;

use wallet_scc::config::SccConfig;
use wallet_scc::logging;
use wallet_scc::scc::{Chain, StaticMachineFactor};
use wallet_scc::signing::ethereum_tx::EthereumTxRequest;
use wallet_scc::storage::{MemoryStore, SqliteStore};
use wallet_scc::SecretCustodyCore;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let config = SccConfig::for_tests();

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let result = if args.get(1).map(String::as_str) == Some("sqlite") {
        let path = args.get(2).cloned().unwrap_or_else(|| "scc-demo.sqlite3".to_string());
        match SqliteStore::new(&path) {
            Ok(store) => {
                let store = Arc::new(store);
                run_demo(config, store.clone(), store).await
            }
            Err(e) => {
                eprintln!("failed to open sqlite store at {path}: {e}");
                return;
            }
        }
    } else {
        let store = Arc::new(MemoryStore::new());
        run_demo(config, store.clone(), store).await
    };

    if let Err(e) = result {
        eprintln!("demo failed: {e}");
        std::process::exit(1);
    }
}

async fn run_demo(
    config: SccConfig,
    identity_store: Arc<dyn wallet_scc::storage::IdentityStore>,
    vault_store: Arc<dyn wallet_scc::storage::VaultStore>,
) -> wallet_scc::Result<()> {
    let machine_factor = Arc::new(StaticMachineFactor(b"scc-demo-machine".to_vec()));
    let core = SecretCustodyCore::new(config, identity_store, vault_store, machine_factor);

    println!("=== Secret Custody Core Demo ===\n");

    let password = "Str0ng!Pass12";
    let registered = core.register("alice", password).await?;
    println!("registered user {}", registered.user_id);
    println!("mnemonic (display once): {}\n", registered.mnemonic.join(" "));

    let login = core.login("alice", password).await?;
    println!("logged in, session {}", login.session_id);
    if login.needs_totp {
        println!("TOTP required but not enrolled in this demo — unreachable path");
        return Ok(());
    }

    let revealed = core.reveal_seed(&login.session_id, password).await?;
    println!("revealed seed matches registration mnemonic: {}", revealed.mnemonic_words == registered.mnemonic);

    let btc_address = core
        .derive_address(&login.session_id, Chain::Bitcoin, 0, 0, 0, Some(password))
        .await?;
    println!("bitcoin address (account 0, index 0): {}", btc_address.address);

    // A distinct (chain, account) pair from the Bitcoin derivation above, so
    // it is not yet warm in the per-session account-key cache — the password
    // is required here too.
    let eth_address = core
        .derive_address(&login.session_id, Chain::Ethereum, 0, 0, 0, Some(password))
        .await?;
    println!("ethereum address (account 0, index 0): {}", eth_address.address);

    let eth_tx = EthereumTxRequest {
        nonce: 0,
        gas_price: vec![0x04, 0xa8, 0x17, 0xc8, 0x00],
        gas_limit: 21_000,
        to: Some([0x11u8; 20]),
        value: vec![0x0d, 0xe0, 0xb6, 0xb3, 0xa7, 0x64, 0x00, 0x00],
        data: vec![],
        chain_id: 1,
    };
    let signed_eth = core
        .sign_ethereum_tx(&login.session_id, password, 0, 0, 0, eth_tx)
        .await?;
    println!("signed ethereum tx: {} bytes", signed_eth.len());

    core.logout(&login.session_id).await?;
    println!("\nsession logged out");

    Ok(())
}
