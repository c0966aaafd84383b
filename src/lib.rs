pub mod alerts;
pub mod chain;
pub mod keeper;
pub mod market_api;
pub mod sportsdata;

use secrecy::SecretString;

// --- Configuration ---

/// Keeper-wide configuration. Every field has a default and an env-var
/// override (`KEEPER_*`).
#[derive(Debug, Clone)]
pub struct KeeperConfig {
    pub rpc_url: String,
    /// Hex private key of the signing account.
    pub private_key: SecretString,
    pub market_api_url: String,
    pub sportsdata_url: String,
    pub sportsdata_api_key: String,
    /// Optional webhook for alerts; log-only when unset.
    pub alert_webhook_url: Option<String>,
    /// Optimistic oracle adapter contract (variant B settlements).
    pub adapter_address: String,
    /// Propose through the optimistic adapter instead of per-market oracles.
    pub use_optimistic_adapter: bool,
    pub max_gas_price_gwei: u64,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub lock_interval_secs: u64,
    pub settle_interval_secs: u64,
    /// How far ahead of its lock time a market becomes eligible.
    pub lock_lead_time_secs: u64,
    /// Finality buffer after the nominal match end before settling.
    pub finalize_delay_secs: u64,
    pub max_concurrent_settlements: usize,
    pub receipt_timeout_secs: u64,
    pub receipt_poll_secs: u64,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".into(),
            private_key: SecretString::from(String::new()),
            market_api_url: "http://127.0.0.1:8080".into(),
            sportsdata_url: "https://api.sportsdata.example".into(),
            sportsdata_api_key: String::new(),
            alert_webhook_url: None,
            adapter_address: String::new(),
            use_optimistic_adapter: false,
            max_gas_price_gwei: 500,
            retry_attempts: 3,
            retry_delay_secs: 10,
            lock_interval_secs: 60,
            settle_interval_secs: 300,
            lock_lead_time_secs: 3600,
            finalize_delay_secs: 600,
            max_concurrent_settlements: 3,
            receipt_timeout_secs: 120,
            receipt_poll_secs: 2,
        }
    }
}

impl KeeperConfig {
    /// Load overrides from environment variables (if set).
    pub fn from_env() -> Self {
        let mut c = Self::default();
        if let Ok(v) = std::env::var("KEEPER_RPC_URL")            { c.rpc_url = v; }
        if let Ok(v) = std::env::var("KEEPER_PRIVATE_KEY")        { c.private_key = SecretString::from(v); }
        if let Ok(v) = std::env::var("KEEPER_MARKET_API_URL")     { c.market_api_url = v; }
        if let Ok(v) = std::env::var("KEEPER_SPORTSDATA_URL")     { c.sportsdata_url = v; }
        if let Ok(v) = std::env::var("KEEPER_SPORTSDATA_API_KEY") { c.sportsdata_api_key = v; }
        if let Ok(v) = std::env::var("KEEPER_ALERT_WEBHOOK_URL")  { c.alert_webhook_url = Some(v); }
        if let Ok(v) = std::env::var("KEEPER_ADAPTER_ADDRESS")    { c.adapter_address = v; }
        if let Ok(v) = std::env::var("KEEPER_USE_OPTIMISTIC_ADAPTER") {
            c.use_optimistic_adapter = v == "1" || v.to_lowercase() == "true";
        }
        if let Ok(v) = std::env::var("KEEPER_MAX_GAS_PRICE_GWEI") { if let Ok(n) = v.parse() { c.max_gas_price_gwei = n; } }
        if let Ok(v) = std::env::var("KEEPER_RETRY_ATTEMPTS")     { if let Ok(n) = v.parse() { c.retry_attempts = n; } }
        if let Ok(v) = std::env::var("KEEPER_RETRY_DELAY_SECS")   { if let Ok(n) = v.parse() { c.retry_delay_secs = n; } }
        if let Ok(v) = std::env::var("KEEPER_LOCK_INTERVAL_SECS") { if let Ok(n) = v.parse() { c.lock_interval_secs = n; } }
        if let Ok(v) = std::env::var("KEEPER_SETTLE_INTERVAL_SECS") { if let Ok(n) = v.parse() { c.settle_interval_secs = n; } }
        if let Ok(v) = std::env::var("KEEPER_LOCK_LEAD_TIME_SECS") { if let Ok(n) = v.parse() { c.lock_lead_time_secs = n; } }
        if let Ok(v) = std::env::var("KEEPER_FINALIZE_DELAY_SECS") { if let Ok(n) = v.parse() { c.finalize_delay_secs = n; } }
        if let Ok(v) = std::env::var("KEEPER_MAX_CONCURRENT_SETTLEMENTS") { if let Ok(n) = v.parse() { c.max_concurrent_settlements = n; } }
        if let Ok(v) = std::env::var("KEEPER_RECEIPT_TIMEOUT_SECS") { if let Ok(n) = v.parse() { c.receipt_timeout_secs = n; } }
        if let Ok(v) = std::env::var("KEEPER_RECEIPT_POLL_SECS")  { if let Ok(n) = v.parse() { c.receipt_poll_secs = n; } }
        c
    }

    /// Gas price ceiling in wei.
    pub fn max_gas_price_wei(&self) -> u128 {
        self.max_gas_price_gwei as u128 * 1_000_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let c = KeeperConfig::default();
        assert_eq!(c.max_concurrent_settlements, 3);
        assert_eq!(c.receipt_timeout_secs, 120);
        assert_eq!(c.receipt_poll_secs, 2);
        assert_eq!(c.max_gas_price_wei(), 500_000_000_000);
    }
}
