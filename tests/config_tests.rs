use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use solana_sdk::signature::{write_keypair_file, Keypair, Signer};

use raffle_settlement::config::{
    ENV_COMMIT_AMOUNT, ENV_NETWORK, ENV_REVEAL_FEE, ENV_SCHEDULER_INTERVAL_SECS,
    ENV_TREASURY_ADDRESS, ENV_TREASURY_KEYPAIR,
};
use raffle_settlement::raffle_error::ConfigError;
use raffle_settlement::settlement::{Address, NetworkId, SettlementSettings};
use raffle_settlement::Config;

fn keypair_file(name: &str) -> (PathBuf, Keypair) {
    let keypair = Keypair::new();
    let path = std::env::temp_dir().join(format!(
        "raffle-config-{}-{}.json",
        name,
        keypair.pubkey()
    ));
    write_keypair_file(&keypair, &path).unwrap();
    (path, keypair)
}

fn load(vars: &HashMap<&str, String>) -> Result<Config, ConfigError> {
    Config::from_lookup(|name| vars.get(name).cloned())
}

fn base_vars(name: &str, network: NetworkId) -> (HashMap<&'static str, String>, Keypair) {
    let (path, keypair) = keypair_file(name);
    let address = Address::pubkey(network, &keypair.pubkey());
    let mut vars = HashMap::new();
    vars.insert(ENV_TREASURY_KEYPAIR, path.display().to_string());
    vars.insert(ENV_TREASURY_ADDRESS, address.to_string());
    (vars, keypair)
}

#[test]
fn test_defaults_applied() {
    let (vars, keypair) = base_vars("defaults", NetworkId::Mainnet);
    let config = load(&vars).unwrap();

    assert_eq!(config.treasury.pubkey(), keypair.pubkey());
    assert_eq!(
        config.treasury_address,
        Address::pubkey(NetworkId::Mainnet, &keypair.pubkey())
    );
    assert_eq!(config.scheduler_interval, Duration::from_secs(60));

    let defaults = SettlementSettings::default();
    assert_eq!(config.settlement.network, NetworkId::Mainnet);
    assert_eq!(config.settlement.fees, defaults.fees);
    assert_eq!(config.settlement.commit_timeout, Duration::from_secs(120));
    assert_eq!(config.settlement.reveal_timeout, Duration::from_secs(120));
}

#[test]
fn test_overrides_and_testnet() {
    let (mut vars, _) = base_vars("testnet", NetworkId::Testnet);
    vars.insert(ENV_NETWORK, "testnet".to_string());
    vars.insert(ENV_SCHEDULER_INTERVAL_SECS, "15".to_string());
    vars.insert(ENV_COMMIT_AMOUNT, "50000000".to_string());

    let config = load(&vars).unwrap();
    assert_eq!(config.settlement.network, NetworkId::Testnet);
    assert_eq!(config.scheduler_interval, Duration::from_secs(15));
    assert_eq!(config.settlement.fees.commit_amount, 50_000_000);
}

#[test]
fn test_missing_keypair_variable() {
    let (mut vars, _) = base_vars("missing", NetworkId::Mainnet);
    vars.remove(ENV_TREASURY_KEYPAIR);
    assert!(matches!(
        load(&vars),
        Err(ConfigError::Missing(ENV_TREASURY_KEYPAIR))
    ));
}

#[test]
fn test_unreadable_keypair_file() {
    let (mut vars, _) = base_vars("unreadable", NetworkId::Mainnet);
    vars.insert(
        ENV_TREASURY_KEYPAIR,
        "/nonexistent/raffle/treasury.json".to_string(),
    );
    assert!(matches!(load(&vars), Err(ConfigError::Keypair { .. })));
}

#[test]
fn test_treasury_address_must_match_keypair() {
    let (mut vars, _) = base_vars("mismatch", NetworkId::Mainnet);
    let other = Address::pubkey(NetworkId::Mainnet, &Keypair::new().pubkey());
    vars.insert(ENV_TREASURY_ADDRESS, other.to_string());
    assert!(matches!(
        load(&vars),
        Err(ConfigError::TreasuryMismatch { .. })
    ));

    // right key, wrong network
    let (mut vars, keypair) = base_vars("network", NetworkId::Mainnet);
    vars.insert(
        ENV_TREASURY_ADDRESS,
        Address::pubkey(NetworkId::Testnet, &keypair.pubkey()).to_string(),
    );
    assert!(matches!(
        load(&vars),
        Err(ConfigError::TreasuryMismatch { .. })
    ));
}

#[test]
fn test_invalid_values_rejected() {
    let (mut vars, _) = base_vars("reveal", NetworkId::Mainnet);
    vars.insert(ENV_REVEAL_FEE, "30000000".to_string());
    assert!(matches!(
        load(&vars),
        Err(ConfigError::Invalid {
            name: ENV_REVEAL_FEE,
            ..
        })
    ));

    let (mut vars, _) = base_vars("interval", NetworkId::Mainnet);
    vars.insert(ENV_SCHEDULER_INTERVAL_SECS, "0".to_string());
    assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

    let (mut vars, _) = base_vars("network-name", NetworkId::Mainnet);
    vars.insert(ENV_NETWORK, "devnet".to_string());
    assert!(matches!(
        load(&vars),
        Err(ConfigError::Invalid {
            name: ENV_NETWORK,
            ..
        })
    ));
}
