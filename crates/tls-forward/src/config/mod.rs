//! Configuration types for tls-forward.

mod listen;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::profile::{ClientProfile, ProfileTable};

pub use listen::{
    ForwardConfig, ListenConfig, TlsConfig, DEFAULT_FORWARD_PATH, DEFAULT_HOST,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT,
};

/// Load `.env` from the working directory or one of its parents.
///
/// Variables already present in the environment keep their values. Returns
/// the file that was read, if any.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Load a specific env file with the same precedence as [`load_dotenv`].
pub fn load_env_file<P: AsRef<Path>>(path: P) -> Result<(), anyhow::Error> {
    dotenvy::from_path(path.as_ref())?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
    /// Fingerprint profiles added to the built-in table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<ClientProfile>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Command line values win over file values.
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.listen.host = host;
        }
        if let Some(port) = port {
            self.listen.port = port;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.listen.port == 0 {
            anyhow::bail!("listen.port must be greater than 0");
        }

        if self.listen.host.trim().is_empty() {
            anyhow::bail!("listen.host must not be empty");
        }

        if let Some(ref tls) = self.listen.tls {
            if tls.cert_path.is_empty() || tls.key_path.is_empty() {
                anyhow::bail!(
                    "TLS listener requires both 'listen.tls.cert_path' and 'listen.tls.key_path'"
                );
            }
        }

        if !self.forward.path.starts_with('/') {
            anyhow::bail!(
                "forward.path must start with '/', got '{}'",
                self.forward.path
            );
        }

        if self.forward.max_body_bytes == 0 {
            anyhow::bail!("forward.max_body_bytes must be greater than 0");
        }

        self.validate_profiles()?;

        Ok(())
    }

    fn validate_profiles(&self) -> Result<(), anyhow::Error> {
        let builtin = ProfileTable::builtin();
        let mut seen = HashSet::new();

        for profile in &self.profiles {
            if profile.name.trim().is_empty() {
                anyhow::bail!("Custom profile names must not be empty");
            }
            if builtin.contains(&profile.name) {
                anyhow::bail!(
                    "Custom profile '{}' clashes with a built-in profile",
                    profile.name
                );
            }
            if !seen.insert(profile.name.as_str()) {
                anyhow::bail!("Custom profile '{}' is defined twice", profile.name);
            }
            if profile.cipher_suites.is_empty() {
                anyhow::bail!("Custom profile '{}' has no cipher suites", profile.name);
            }
            if profile.kx_groups.is_empty() {
                anyhow::bail!(
                    "Custom profile '{}' has no key exchange groups",
                    profile.name
                );
            }
        }

        Ok(())
    }

    /// Built-in profiles plus the custom ones from this configuration.
    pub fn profile_table(&self) -> Result<ProfileTable, anyhow::Error> {
        let mut table = ProfileTable::builtin();
        table
            .extend(self.profiles.clone())
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(table)
    }
}
