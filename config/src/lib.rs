//! Tessera Configuration
//!
//! Shared configuration crate for all Tessera components.
//!
//! Handles loading configuration from:
//! 1. TESSERA_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.tessera/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{env, fs};

use tessera_privacy::{Address, AssetId, LookupTables, ProgramId};

/// Global config instance for convenience access
pub static GLOBAL_CONFIG: OnceLock<TesseraConfig> = OnceLock::new();

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".tessera";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_RELAYER_URL: &str = "http://127.0.0.1:3332";
const DEFAULT_RELAYER_RECIPIENT: &str = "36FVq4f34HycqqNNxByhaPQTKxGCyY7HZMY6sUuJZbJi";
const DEFAULT_RELAYER_FEE_RECIPIENT: &str = "Dy3Xx7CUUfq9izoF9NjodqVndktPm7FJbaA5doLPrgP2";
const DEFAULT_RELAYER_FEE: u64 = 100_000;
/// Charged when the unshield recipient's token account has to be created.
const DEFAULT_HIGH_RELAYER_FEE: u64 = 2_039_280;
const DEFAULT_RELAYER_TIMEOUT_SECS: u64 = 30;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";
const DEFAULT_MERKLE_TREE: &str = "Fos6xtCbxdqpczSwUCKH24Y2rJMpaJnnXuwS1KVYb8oF";
const DEFAULT_NATIVE_POOL: &str = "C6U6TuGo4eVYwWiFNWhgv8o5Vrw1ETqb1TYm5agh28E3";
const DEFAULT_TOKEN_POOL: &str = "AG8HsHc281A85QdjfRRZoCiRqVb85PjJ1AeeWQp74tZG";

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_RETRY_MAX_MS: u64 = 10_000;
const DEFAULT_SUBMIT_ATTEMPTS: u32 = 3;

const DEFAULT_MERGE_CAP: usize = 10;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TesseraConfig {
    #[serde(default)]
    pub relayer: RelayerConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub transaction: TransactionConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
}

/// Relayer endpoint and fee schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    #[serde(default = "default_relayer_url")]
    pub url: String,
    /// Account that pays for relayed transactions
    #[serde(default = "default_relayer_recipient")]
    pub recipient: String,
    #[serde(default = "default_relayer_fee_recipient")]
    pub fee_recipient: String,
    #[serde(default = "default_relayer_fee")]
    pub fee: u64,
    #[serde(default = "default_high_relayer_fee")]
    pub high_fee: u64,
    #[serde(default = "default_relayer_timeout")]
    pub timeout_secs: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAYER_URL.into(),
            recipient: DEFAULT_RELAYER_RECIPIENT.into(),
            fee_recipient: DEFAULT_RELAYER_FEE_RECIPIENT.into(),
            fee: DEFAULT_RELAYER_FEE,
            high_fee: DEFAULT_HIGH_RELAYER_FEE,
            timeout_secs: DEFAULT_RELAYER_TIMEOUT_SECS,
        }
    }
}

fn default_relayer_url() -> String {
    DEFAULT_RELAYER_URL.into()
}
fn default_relayer_recipient() -> String {
    DEFAULT_RELAYER_RECIPIENT.into()
}
fn default_relayer_fee_recipient() -> String {
    DEFAULT_RELAYER_FEE_RECIPIENT.into()
}
fn default_relayer_fee() -> u64 {
    DEFAULT_RELAYER_FEE
}
fn default_high_relayer_fee() -> u64 {
    DEFAULT_HIGH_RELAYER_FEE
}
fn default_relayer_timeout() -> u64 {
    DEFAULT_RELAYER_TIMEOUT_SECS
}

/// Ledger RPC endpoint and pool accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,
    #[serde(default = "default_merkle_tree")]
    pub merkle_tree: String,
    #[serde(default = "default_native_pool")]
    pub native_pool: String,
    #[serde(default = "default_token_pool")]
    pub token_pool: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.into(),
            merkle_tree: DEFAULT_MERKLE_TREE.into(),
            native_pool: DEFAULT_NATIVE_POOL.into(),
            token_pool: DEFAULT_TOKEN_POOL.into(),
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.into()
}
fn default_merkle_tree() -> String {
    DEFAULT_MERKLE_TREE.into()
}
fn default_native_pool() -> String {
    DEFAULT_NATIVE_POOL.into()
}
fn default_token_pool() -> String {
    DEFAULT_TOKEN_POOL.into()
}

/// Retry policy for remote reads and transaction submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_submit_attempts")]
    pub submit_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_RETRY_BASE_MS,
            max_backoff_ms: DEFAULT_RETRY_MAX_MS,
            submit_attempts: DEFAULT_SUBMIT_ATTEMPTS,
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_retry_base_ms() -> u64 {
    DEFAULT_RETRY_BASE_MS
}
fn default_retry_max_ms() -> u64 {
    DEFAULT_RETRY_MAX_MS
}
fn default_submit_attempts() -> u32 {
    DEFAULT_SUBMIT_ATTEMPTS
}

/// Verifier circuit selection for TOML config
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerifierToml {
    #[default]
    TwoInTwoOut,
    TenInTwoOut,
    FourInFourOut,
    Storage,
}

impl std::str::FromStr for VerifierToml {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "two_in_two_out" | "zero" => Ok(Self::TwoInTwoOut),
            "ten_in_two_out" | "one" => Ok(Self::TenInTwoOut),
            "four_in_four_out" | "two" => Ok(Self::FourInFourOut),
            "storage" => Ok(Self::Storage),
            other => Err(format!("unknown verifier: {other}")),
        }
    }
}

/// Transaction building options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    #[serde(default)]
    pub verifier: VerifierToml,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
    #[serde(default = "default_merge_cap")]
    pub merge_cap: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            verifier: VerifierToml::default(),
            shuffle: true,
            merge_cap: DEFAULT_MERGE_CAP,
        }
    }
}

fn default_shuffle() -> bool {
    true
}
fn default_merge_cap() -> usize {
    DEFAULT_MERGE_CAP
}

/// Asset and verifier lookup tables, base58 encoded.
///
/// The native asset is implicit at index 0 and must not be listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupConfig {
    #[serde(default)]
    pub assets: Vec<String>,
    #[serde(default)]
    pub verifiers: Vec<String>,
}

impl LookupConfig {
    /// Decode into the tables the codec indexes into.
    pub fn tables(&self) -> Result<LookupTables> {
        let assets = self
            .assets
            .iter()
            .map(|a| {
                a.parse::<AssetId>()
                    .with_context(|| format!("Invalid asset in lookup table: {a}"))
            })
            .collect::<Result<Vec<_>>>()?;
        let verifiers = self
            .verifiers
            .iter()
            .map(|v| {
                v.parse::<ProgramId>()
                    .with_context(|| format!("Invalid verifier in lookup table: {v}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(LookupTables::new(assets, verifiers))
    }
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

/// Check if env var is set to a truthy value ("1" or "true")
fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl TesseraConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check TESSERA_CONFIG env var
        if let Ok(path) = env::var("TESSERA_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("TESSERA_CONFIG points to missing file: {}", path.display());
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.tessera/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Relayer
        env_string("TESSERA_RELAYER_URL", &mut self.relayer.url);
        env_string("TESSERA_RELAYER_RECIPIENT", &mut self.relayer.recipient);
        env_string("TESSERA_RELAYER_FEE_RECIPIENT", &mut self.relayer.fee_recipient);
        env_parse("TESSERA_RELAYER_FEE", &mut self.relayer.fee);
        env_parse("TESSERA_RELAYER_HIGH_FEE", &mut self.relayer.high_fee);

        // RPC
        env_string("TESSERA_RPC_URL", &mut self.rpc.url);
        env_string("TESSERA_MERKLE_TREE", &mut self.rpc.merkle_tree);

        // Retry
        env_parse("TESSERA_MAX_ATTEMPTS", &mut self.retry.max_attempts);
        env_parse("TESSERA_RETRY_BASE_MS", &mut self.retry.base_backoff_ms);
        env_parse("TESSERA_SUBMIT_ATTEMPTS", &mut self.retry.submit_attempts);

        // Transaction
        env_parse("TESSERA_VERIFIER", &mut self.transaction.verifier);
        if let Some(v) = env_bool("TESSERA_SHUFFLE") {
            self.transaction.shuffle = v;
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.lookup.assets = vec!["9hGdMK6RVJEcUVVBzBeJFQsS2mv7WMQ2zFd2JmpwLPFE".into()];
        toml::to_string_pretty(&sample).unwrap_or_default()
    }

    /// Get the global config instance, initializing it if necessary.
    ///
    /// Falls back to defaults if loading fails.
    pub fn global() -> &'static TesseraConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                log::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            })
        })
    }

    /// Returns `None` if config hasn't been initialized yet.
    pub fn try_global() -> Option<&'static TesseraConfig> {
        GLOBAL_CONFIG.get()
    }

    /// Initialize the global config with a specific instance.
    ///
    /// Returns `Err(config)` if already initialized.
    pub fn set_global(config: TesseraConfig) -> std::result::Result<(), TesseraConfig> {
        GLOBAL_CONFIG.set(config)
    }
}

/// Shorthand for `TesseraConfig::global()`.
#[inline]
pub fn global_config() -> &'static TesseraConfig {
    TesseraConfig::global()
}

// ============================================================================
// Decoded Config
// ============================================================================

use std::time::Duration;

fn parse_address(field: &str, value: &str) -> Result<Address> {
    value
        .parse()
        .with_context(|| format!("Invalid {field} in config: {value}"))
}

/// Relayer section with addresses decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerRuntime {
    pub url: String,
    pub recipient: Address,
    pub fee_recipient: Address,
    pub fee: u64,
    pub high_fee: u64,
    pub timeout: Duration,
}

impl RelayerConfig {
    /// Decode the relayer addresses. A malformed address is an error, never
    /// a zero address.
    ///
    /// # Example
    /// ```ignore
    /// let relayer = TesseraConfig::global().relayer.runtime()?;
    /// let recipient = relayer.recipient; // Address, already decoded
    /// ```
    pub fn runtime(&self) -> Result<RelayerRuntime> {
        Ok(RelayerRuntime {
            url: self.url.clone(),
            recipient: parse_address("relayer.recipient", &self.recipient)?,
            fee_recipient: parse_address("relayer.fee_recipient", &self.fee_recipient)?,
            fee: self.fee,
            high_fee: self.high_fee,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

/// RPC section with pool accounts decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRuntime {
    pub url: String,
    pub merkle_tree: Address,
    pub native_pool: Address,
    pub token_pool: Address,
}

impl RpcConfig {
    pub fn runtime(&self) -> Result<RpcRuntime> {
        Ok(RpcRuntime {
            url: self.url.clone(),
            merkle_tree: parse_address("rpc.merkle_tree", &self.merkle_tree)?,
            native_pool: parse_address("rpc.native_pool", &self.native_pool)?,
            token_pool: parse_address("rpc.token_pool", &self.token_pool)?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TesseraConfig::default();
        assert_eq!(config.relayer.url, DEFAULT_RELAYER_URL);
        assert_eq!(config.relayer.fee, DEFAULT_RELAYER_FEE);
        assert_eq!(config.transaction.verifier, VerifierToml::TwoInTwoOut);
        assert!(config.transaction.shuffle, "shuffling is on by default");
        assert_eq!(config.transaction.merge_cap, 10);
    }

    #[test]
    fn test_generate_sample() {
        let sample = TesseraConfig::generate_sample();
        assert!(sample.contains("[relayer]"));
        assert!(sample.contains("[rpc]"));
        assert!(sample.contains("[retry]"));
        assert!(sample.contains("[transaction]"));
        assert!(sample.contains("[lookup]"));
    }

    #[test]
    fn test_parse_sample() {
        let sample = TesseraConfig::generate_sample();
        let parsed: TesseraConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.relayer.url, DEFAULT_RELAYER_URL);
        let tables = parsed.lookup.tables().unwrap();
        assert_eq!(tables.assets().len(), 2, "native plus one token");
    }

    #[test]
    fn test_default_addresses_decode() {
        for value in [
            DEFAULT_RELAYER_RECIPIENT,
            DEFAULT_RELAYER_FEE_RECIPIENT,
            DEFAULT_MERKLE_TREE,
            DEFAULT_NATIVE_POOL,
            DEFAULT_TOKEN_POOL,
        ] {
            assert!(value.parse::<Address>().is_ok(), "{value} should decode");
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[relayer]
url = "http://relayer.test"
fee = 42

[transaction]
verifier = "ten_in_two_out"
"#
        )
        .unwrap();

        let config = TesseraConfig::load_from(file.path()).unwrap();
        assert_eq!(config.relayer.url, "http://relayer.test");
        assert_eq!(config.relayer.fee, 42);
        assert_eq!(config.relayer.high_fee, DEFAULT_HIGH_RELAYER_FEE, "missing fields default");
        assert_eq!(config.transaction.verifier, VerifierToml::TenInTwoOut);
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[relayer\nurl = ").unwrap();

        let err = TesseraConfig::load_from(file.path()).unwrap_err();
        assert!(
            format!("{err:#}").contains("Failed to parse config file"),
            "error should carry file context: {err:#}"
        );
    }

    #[test]
    fn test_runtime_decodes_defaults() {
        let config = TesseraConfig::default();
        let relayer = config.relayer.runtime().unwrap();
        assert_eq!(relayer.recipient, DEFAULT_RELAYER_RECIPIENT.parse::<Address>().unwrap());
        assert_eq!(relayer.timeout, Duration::from_secs(DEFAULT_RELAYER_TIMEOUT_SECS));
        let rpc = config.rpc.runtime().unwrap();
        assert_eq!(rpc.token_pool, DEFAULT_TOKEN_POOL.parse::<Address>().unwrap());
    }

    #[test]
    fn test_runtime_rejects_bad_address() {
        let mut config = TesseraConfig::default();
        config.relayer.fee_recipient = "0OIl".into();
        let err = config.relayer.runtime().unwrap_err();
        assert!(
            format!("{err:#}").contains("relayer.fee_recipient"),
            "error should name the field: {err:#}"
        );

        config.rpc.merkle_tree = String::new();
        assert!(config.rpc.runtime().is_err(), "empty address is not the zero address");
    }

    #[test]
    fn test_invalid_lookup_entry_rejected() {
        let lookup = LookupConfig {
            assets: vec!["not-base58!".into()],
            verifiers: vec![],
        };
        assert!(lookup.tables().is_err());
    }

    #[test]
    fn test_env_override() {
        // SAFETY: no other test reads or writes this variable.
        unsafe { env::set_var("TESSERA_SUBMIT_ATTEMPTS", "7") };
        let mut config = TesseraConfig::default();
        config.apply_env_overrides();
        unsafe { env::remove_var("TESSERA_SUBMIT_ATTEMPTS") };

        assert_eq!(config.retry.submit_attempts, 7);
    }

    #[test]
    fn test_verifier_from_str() {
        assert_eq!("storage".parse::<VerifierToml>(), Ok(VerifierToml::Storage));
        assert_eq!("ONE".parse::<VerifierToml>(), Ok(VerifierToml::TenInTwoOut));
        assert!("bogus".parse::<VerifierToml>().is_err());
    }
}
