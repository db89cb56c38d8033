//! Configuration - environment driven
//!
//! | Variable | Default |
//! |---|---|
//! | `EMBEDDING_PROVIDER` (alias `LLM_PROVIDER`) | `openai` if a key is set, else `hashing` |
//! | `OPENAI_API_KEY` | - |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `LMSTUDIO_BASE_URL` | `http://localhost:1234/v1` |
//! | `EMBEDDING_MODEL` | `text-embedding-3-small` |
//! | `EMBEDDING_TIMEOUT_SECS` | `60` |
//! | `DATA_FILE_PATH` | - |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::embedding::DEFAULT_MODEL;

/// Default LM Studio server
pub const DEFAULT_LMSTUDIO_URL: &str = "http://localhost:1234/v1";

/// Default bound on an index build
pub const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Types
// ============================================================================

/// Embedding backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI API (needs `OPENAI_API_KEY`)
    OpenAi,
    /// Local LM Studio, OpenAI-compatible
    LmStudio,
    /// Offline feature hashing
    Hashing,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "lmstudio" | "lm-studio" => Ok(Self::LmStudio),
            "hashing" | "offline" => Ok(Self::Hashing),
            other => bail!(
                "Unknown embedding provider: '{}'. Use openai, lmstudio or hashing",
                other
            ),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OpenAi => "openai",
            Self::LmStudio => "lmstudio",
            Self::Hashing => "hashing",
        };
        f.write_str(name)
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderKind,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub lmstudio_base_url: String,
    pub embedding_model: String,
    /// Upper bound for building the semantic index
    pub embedding_timeout: Duration,
    /// Dataset to upload at startup
    pub data_file_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Hashing,
            openai_api_key: None,
            openai_base_url: None,
            lmstudio_base_url: DEFAULT_LMSTUDIO_URL.to_string(),
            embedding_model: DEFAULT_MODEL.to_string(),
            embedding_timeout: Duration::from_secs(DEFAULT_EMBEDDING_TIMEOUT_SECS),
            data_file_path: None,
        }
    }
}

impl Config {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = get("OPENAI_API_KEY");

        let provider = match get("EMBEDDING_PROVIDER").or_else(|| get("LLM_PROVIDER")) {
            Some(name) => name.parse()?,
            None if openai_api_key.is_some() => ProviderKind::OpenAi,
            None => {
                tracing::warn!("OPENAI_API_KEY not set, falling back to offline hashing embeddings");
                ProviderKind::Hashing
            }
        };

        let openai_base_url = get("OPENAI_BASE_URL")
            .map(|u| validate_url(&u, "OPENAI_BASE_URL"))
            .transpose()?;

        let lmstudio_base_url = validate_url(
            &get("LMSTUDIO_BASE_URL").unwrap_or_else(|| DEFAULT_LMSTUDIO_URL.to_string()),
            "LMSTUDIO_BASE_URL",
        )?;

        let embedding_timeout = match get("EMBEDDING_TIMEOUT_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .trim()
                    .parse()
                    .with_context(|| format!("EMBEDDING_TIMEOUT_SECS is not a number: {}", v))?;
                if secs == 0 {
                    bail!("EMBEDDING_TIMEOUT_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_EMBEDDING_TIMEOUT_SECS),
        };

        Ok(Self {
            provider,
            openai_api_key,
            openai_base_url,
            lmstudio_base_url,
            embedding_model: get("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            embedding_timeout,
            data_file_path: get("DATA_FILE_PATH").map(PathBuf::from),
        })
    }

    /// API key present
    pub fn has_api_key(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

/// Reject anything that is not an absolute http(s) URL.
fn validate_url(raw: &str, var: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim()).with_context(|| format!("{} is not a valid URL", var))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("{} must use http or https, got '{}'", var, parsed.scheme());
    }
    Ok(raw.trim().to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_key_use_hashing() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.provider, ProviderKind::Hashing);
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert_eq!(config.lmstudio_base_url, DEFAULT_LMSTUDIO_URL);
        assert_eq!(config.embedding_timeout, Duration::from_secs(60));
        assert!(config.data_file_path.is_none());
        assert!(!config.has_api_key());
    }

    #[test]
    fn test_key_selects_openai() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert!(config.has_api_key());
    }

    #[test]
    fn test_explicit_provider_and_alias() {
        let config = Config::from_lookup(lookup(&[
            ("LLM_PROVIDER", "lmstudio"),
            ("LMSTUDIO_BASE_URL", "http://192.168.2.57:1234/v1"),
        ]))
        .unwrap();
        assert_eq!(config.provider, ProviderKind::LmStudio);
        assert_eq!(config.lmstudio_base_url, "http://192.168.2.57:1234/v1");

        let config = Config::from_lookup(lookup(&[
            ("EMBEDDING_PROVIDER", "hashing"),
            ("LLM_PROVIDER", "openai"),
        ]))
        .unwrap();
        assert_eq!(config.provider, ProviderKind::Hashing);
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", ""), ("DATA_FILE_PATH", " ")]))
            .unwrap();
        assert!(!config.has_api_key());
        assert!(config.data_file_path.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("EMBEDDING_PROVIDER", "gemini")])).is_err());
        assert!(Config::from_lookup(lookup(&[("LMSTUDIO_BASE_URL", "not a url")])).is_err());
        assert!(Config::from_lookup(lookup(&[("OPENAI_BASE_URL", "ftp://host/v1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("EMBEDDING_TIMEOUT_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("EMBEDDING_TIMEOUT_SECS", "0")])).is_err());
    }

    #[test]
    fn test_provider_display_round_trip() {
        for kind in [ProviderKind::OpenAi, ProviderKind::LmStudio, ProviderKind::Hashing] {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
    }
}
