use serde::Deserialize;
use skybook_core::Pbkdf2Verifier;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub credentials: CredentialPolicy,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

/// Fixed hashing policy for the credential verifier. The whole deployment
/// must share one policy or stored digests stop matching.
#[derive(Debug, Deserialize, Clone)]
pub struct CredentialPolicy {
    #[serde(default = "default_salt")]
    pub salt: String,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_key_length")]
    pub key_length: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_itinerary_limit")]
    pub default_itinerary_limit: i64,
}

fn default_database_url() -> String {
    "postgres://localhost/skybook".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    3
}

fn default_salt() -> String {
    "1234".to_string()
}

fn default_iterations() -> u32 {
    1024
}

fn default_key_length() -> usize {
    16
}

fn default_itinerary_limit() -> i64 {
    100
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            salt: default_salt(),
            iterations: default_iterations(),
            key_length: default_key_length(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_itinerary_limit: default_itinerary_limit(),
        }
    }
}

impl CredentialPolicy {
    pub fn verifier(&self) -> Pbkdf2Verifier {
        Pbkdf2Verifier::new(self.salt.as_bytes().to_vec(), self.iterations, self.key_length)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            // Optional per-environment file, e.g. config/production
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `SKYBOOK__DATABASE__URL=...`
            .add_source(config::Environment::with_prefix("SKYBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skybook_core::CredentialVerifier;

    #[test]
    fn defaults_apply_without_config_files() {
        let config = Config::load().expect("defaults should deserialize");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.search.default_itinerary_limit, 100);
        assert_eq!(config.credentials.key_length, 16);
    }

    #[test]
    fn policy_builds_a_working_verifier() {
        let policy = CredentialPolicy::default();
        let digest = policy.verifier().digest("pw");
        assert_eq!(digest.len(), policy.key_length);
    }
}
