//! Synthesis configuration model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration for a synthesis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Directory the cloud assembly is written to.
    pub output_dir: PathBuf,
    /// Whether warning annotations fail synthesis.
    pub strict: bool,
    /// Environment applied to stacks that do not declare their own.
    pub environment: Environment,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(constants::DEFAULT_OUTPUT_DIR),
            strict: false,
            environment: Environment::default(),
        }
    }
}

impl SynthConfig {
    /// Builds a configuration from defaults overlaid with `STRATUS_*`
    /// environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up through `lookup`.
    #[must_use]
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(constants::ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(region) = lookup(constants::ENV_REGION) {
            self.environment.region = region;
        }
        if let Some(account) = lookup(constants::ENV_ACCOUNT) {
            self.environment.account = Some(account);
        }
        if let Some(strict) = lookup(constants::ENV_STRICT) {
            self.strict = matches!(strict.as_str(), "1" | "true" | "yes");
        }
        self
    }
}

/// Target account and region of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Account id, or `None` for an environment-agnostic stack.
    pub account: Option<String>,
    /// Region name.
    pub region: String,
    /// Explicit availability zones. Derived from the region when empty.
    pub availability_zones: Vec<String>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            account: None,
            region: constants::DEFAULT_REGION.to_string(),
            availability_zones: Vec::new(),
        }
    }
}

impl Environment {
    /// Returns up to `max` availability zones for this environment.
    ///
    /// Without explicit zones, names are derived from the region
    /// (`<region>a`, `<region>b`, ...).
    #[must_use]
    pub fn availability_zones(&self, max: usize) -> Vec<String> {
        if self.availability_zones.is_empty() {
            ('a'..='z')
                .take(max)
                .map(|suffix| format!("{}{suffix}", self.region))
                .collect()
        } else {
            self.availability_zones.iter().take(max).cloned().collect()
        }
    }

    /// Returns the `aws://account/region` form recorded in manifests.
    #[must_use]
    pub fn uri(&self) -> String {
        let account = self.account.as_deref().unwrap_or("unknown-account");
        format!("aws://{account}/{}", self.region)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_uses_constants() {
        let config = SynthConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("stratus.out"));
        assert!(!config.strict);
        assert_eq!(config.environment.region, "us-east-1");
    }

    #[test]
    fn overlay_applies_every_variable() {
        let vars: HashMap<&str, &str> = [
            ("STRATUS_OUTDIR", "/tmp/out"),
            ("STRATUS_REGION", "eu-west-1"),
            ("STRATUS_ACCOUNT", "123456789012"),
            ("STRATUS_STRICT", "true"),
        ]
        .into_iter()
        .collect();
        let config =
            SynthConfig::default().overlay(|key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.environment.region, "eu-west-1");
        assert_eq!(config.environment.account.as_deref(), Some("123456789012"));
        assert!(config.strict);
    }

    #[test]
    fn from_env_reads_the_process_environment() {
        let config = SynthConfig::from_env();
        let output_dir = std::env::var(constants::ENV_OUTPUT_DIR)
            .map_or_else(|_| PathBuf::from(constants::DEFAULT_OUTPUT_DIR), PathBuf::from);
        let region = std::env::var(constants::ENV_REGION)
            .unwrap_or_else(|_| constants::DEFAULT_REGION.to_string());
        assert_eq!(config.output_dir, output_dir);
        assert_eq!(config.environment.region, region);
        assert_eq!(config.environment.account, std::env::var(constants::ENV_ACCOUNT).ok());
    }

    #[test]
    fn derived_availability_zones() {
        let env = Environment {
            region: "eu-central-1".into(),
            ..Environment::default()
        };
        assert_eq!(
            env.availability_zones(3),
            vec!["eu-central-1a", "eu-central-1b", "eu-central-1c"]
        );
    }

    #[test]
    fn explicit_availability_zones_are_truncated() {
        let env = Environment {
            availability_zones: vec!["z1".into(), "z2".into(), "z3".into()],
            ..Environment::default()
        };
        assert_eq!(env.availability_zones(2), vec!["z1", "z2"]);
    }

    #[test]
    fn uri_without_account() {
        let env = Environment::default();
        assert_eq!(env.uri(), "aws://unknown-account/us-east-1");
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let config: SynthConfig =
            serde_json::from_str(r#"{"strict": true}"#).expect("deserialize");
        assert!(config.strict);
        assert_eq!(config.environment.region, "us-east-1");
    }
}
