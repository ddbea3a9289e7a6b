/// REGISTRY CONFIGURATION
///
/// Loaded from an optional file (format picked by extension) with
/// `BLEEP_COURT_*` environment variables layered on top, e.g.
/// `BLEEP_COURT_MIN_ACTIVE_BALANCE=1000`.

use crate::error::RegistryError;
use crate::juror::JurorAddress;
use bleep_sumtree::MAX_UINT192;
use config::{Config, Environment, File};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "BLEEP_COURT";

/// Search passes a single draft may run before returning a partial batch.
pub const DEFAULT_MAX_DRAFT_ITERATIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Address allowed to draft, lock and settle
    pub court: JurorAddress,
    /// Address allowed to change registry parameters
    pub governor: JurorAddress,
    /// Minimum active balance at genesis
    #[serde(with = "amount")]
    pub min_active_balance: U256,
    /// Cap on the total active balance of any term
    #[serde(with = "amount")]
    pub total_active_balance_limit: U256,
    pub max_draft_iterations: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            court: JurorAddress::new("court"),
            governor: JurorAddress::new("governor"),
            min_active_balance: U256::one(),
            total_active_balance_limit: MAX_UINT192,
            max_draft_iterations: DEFAULT_MAX_DRAFT_ITERATIONS,
        }
    }
}

impl RegistryConfig {
    /// Build from `path` (if given) and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, RegistryError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

        let config: RegistryConfig = builder
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(|e| RegistryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.court.is_empty() || self.governor.is_empty() {
            return Err(RegistryError::Config("court and governor addresses are required".into()));
        }
        if self.total_active_balance_limit.is_zero() {
            return Err(RegistryError::InvalidActiveBalanceLimit);
        }
        if self.max_draft_iterations == 0 {
            return Err(RegistryError::Config("max_draft_iterations must be at least 1".into()));
        }
        if self.min_active_balance > MAX_UINT192 || self.total_active_balance_limit > MAX_UINT192 {
            return Err(RegistryError::Config("amounts must fit in 192 bits".into()));
        }
        Ok(())
    }
}

/// Amounts as decimal strings; plain integers are accepted on input.
pub mod amount {
    use primitive_types::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Int(value) => Ok(U256::from(value)),
            Raw::Text(text) => U256::from_dec_str(text.trim())
                .map_err(|e| de::Error::custom(format!("invalid amount {:?}: {:?}", text, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RegistryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_draft_iterations, 10);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RegistryConfig::default();
        config.total_active_balance_limit = U256::zero();
        assert_eq!(config.validate(), Err(RegistryError::InvalidActiveBalanceLimit));

        let mut config = RegistryConfig::default();
        config.max_draft_iterations = 0;
        assert!(matches!(config.validate(), Err(RegistryError::Config(_))));

        let mut config = RegistryConfig::default();
        config.court = JurorAddress::new("");
        assert!(matches!(config.validate(), Err(RegistryError::Config(_))));
    }

    #[test]
    fn test_load_from_file_reads_decimal_amounts() {
        let path = std::env::temp_dir().join(format!("bleep-court-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "court = \"0xc0\"\ngovernor = \"0x90\"\nmin_active_balance = \"340282366920938463463374607431768211456\"\nmax_draft_iterations = 4\n",
        )
        .unwrap();

        let config = RegistryConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.court, JurorAddress::new("0xc0"));
        assert_eq!(config.min_active_balance, U256::one() << 128u32);
        assert_eq!(config.max_draft_iterations, 4);
        assert_eq!(config.total_active_balance_limit, MAX_UINT192);
    }
}
