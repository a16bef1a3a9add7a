use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use anyhow::anyhow;
use tracing::{info, warn};

use crate::alerts::DEFAULT_URGENCY_TERMS;
use crate::cluster::{ClusterOptions, ResidualPolicy};
use crate::llm::ModelConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub process_timeout: Duration,
    pub export_dir: PathBuf,
    pub cluster: ClusterOptions,
    pub urgency_terms: Vec<String>,
    pub model: Option<ModelConfig>,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let timeout_secs: u64 = try_load("AITS_PROCESS_TIMEOUT_SECS", "60")?;
        let residual: String = try_load("AITS_RESIDUAL_POLICY", "miscellaneous")?;

        let mut urgency_terms: Vec<String> =
            DEFAULT_URGENCY_TERMS.iter().map(|t| t.to_string()).collect();
        if let Ok(extra) = var("AITS_URGENCY_TERMS") {
            urgency_terms.extend(parse_terms(&extra));
        }

        let model = match var("AITS_MODEL_API_KEY") {
            Ok(api_key) if !api_key.trim().is_empty() => Some(ModelConfig {
                base_url: try_load("AITS_MODEL_URL", "https://api.openai.com")?,
                api_key: api_key.trim().to_string(),
                model: try_load("AITS_MODEL_NAME", "gpt-4o-mini")?,
            }),
            _ => None,
        };

        Ok(Self {
            port: try_load("AITS_PORT", "5000")?,
            database_url: var("DATABASE_URL").ok(),
            process_timeout: Duration::from_secs(timeout_secs.max(1)),
            export_dir: try_load("AITS_EXPORT_DIR", "exports")?,
            cluster: ClusterOptions {
                min_cluster_size: try_load("AITS_MIN_CLUSTER_SIZE", "2")?,
                similarity_threshold: try_load("AITS_SIMILARITY_THRESHOLD", "0.25")?,
                residual: residual.parse().map_err(|e: String| anyhow!(e))?,
            },
            urgency_terms,
            model,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            database_url: None,
            process_timeout: Duration::from_secs(60),
            export_dir: PathBuf::from("exports"),
            cluster: ClusterOptions::default(),
            urgency_terms: DEFAULT_URGENCY_TERMS.iter().map(|t| t.to_string()).collect(),
            model: None,
        }
    }
}

impl FromStr for ResidualPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "miscellaneous" | "misc" => Ok(ResidualPolicy::Miscellaneous),
            "drop" => Ok(ResidualPolicy::Drop),
            other => Err(format!("unknown residual policy '{other}'")),
        }
    }
}

pub fn parse_terms(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect()
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not found");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow!("environment misconfigured: invalid {key} ({e})")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_are_trimmed_and_lowercased() {
        assert_eq!(
            parse_terms(" Bullying, ,THEFT ,"),
            vec!["bullying".to_string(), "theft".to_string()]
        );
    }

    #[test]
    fn residual_policy_parses() {
        assert_eq!("drop".parse::<ResidualPolicy>(), Ok(ResidualPolicy::Drop));
        assert_eq!(
            "Misc".parse::<ResidualPolicy>(),
            Ok(ResidualPolicy::Miscellaneous)
        );
        assert!("merge".parse::<ResidualPolicy>().is_err());
    }

    #[test]
    fn defaults_carry_the_base_lexicon() {
        let config = Config::default();
        assert!(config.urgency_terms.iter().any(|t| t == "hygiene"));
        assert_eq!(config.cluster.min_cluster_size, 2);
    }
}
