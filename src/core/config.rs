//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{PvtdError, Result};

/// Largest accepted campaign deadline (one week).
pub const MAX_DEADLINE_SECS: u64 = 7 * 24 * 60 * 60;

/// Full pvtd configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub campaign: CampaignConfig,
    pub verify: VerifyConfig,
    pub cluster: ClusterConfig,
    pub paths: PathsConfig,
}

/// What a cleanup campaign targets and how it is scheduled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CampaignConfig {
    /// Claim-name fragments deleted one by one, with verification.
    pub fragments: Vec<String>,
    /// Namespaces whose remaining claims are bulk-deleted.
    pub namespaces: Vec<String>,
    /// Chart name -> namespaces it installs into (selectable with `--chart`).
    pub charts: BTreeMap<String, Vec<String>>,
    /// Worker threads per phase. 1 processes items strictly one at a time.
    pub concurrency: usize,
    /// Overall campaign deadline in seconds (0 disables).
    pub deadline_secs: u64,
    /// Report what would be deleted without deleting anything.
    pub dry_run: bool,
}

/// Polling policy for deletion verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifyConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

/// How the cluster is reached.
///
/// With neither `kubeconfig` nor `context` set, the client is inferred the
/// usual way: `$KUBECONFIG` or `~/.kube/config`, then in-cluster service
/// account credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Kubeconfig context to use instead of the current one.
    pub context: Option<String>,
    /// Kubeconfig file to read instead of the default location.
    pub kubeconfig: Option<PathBuf>,
    /// Connect and read timeout per API request (0 keeps the client default).
    pub request_timeout_secs: u64,
}

/// Filesystem paths used by pvtd.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            fragments: vec!["consul".to_string(), "postgres".to_string()],
            namespaces: vec![
                "logging".to_string(),
                "frontend".to_string(),
                "backend".to_string(),
            ],
            charts: BTreeMap::new(),
            concurrency: 1,
            deadline_secs: 0,
            dry_run: false,
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval_ms: 1_000,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            context: None,
            kubeconfig: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[PVTD-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("pvtd").join("config.toml"),
            jsonl_log: home_dir
                .join(".local")
                .join("share")
                .join("pvtd")
                .join("activity.jsonl"),
        }
    }
}

impl VerifyConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl CampaignConfig {
    /// Overall deadline, if one is configured.
    #[must_use]
    pub const fn deadline(&self) -> Option<Duration> {
        if self.deadline_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.deadline_secs))
        }
    }

    /// Namespaces a chart installs into.
    pub fn chart_namespaces(&self, chart: &str) -> Result<&[String]> {
        self.charts
            .get(chart)
            .map(Vec::as_slice)
            .ok_or_else(|| PvtdError::InvalidConfig {
                details: format!(
                    "unknown chart '{chart}' (configured: {})",
                    self.charts.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            })
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| PvtdError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(PvtdError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // campaign
        if let Some(raw) = lookup("PVTD_CAMPAIGN_FRAGMENTS") {
            self.campaign.fragments = parse_env_list(&raw);
        }
        if let Some(raw) = lookup("PVTD_CAMPAIGN_NAMESPACES") {
            self.campaign.namespaces = parse_env_list(&raw);
        }
        if let Some(raw) = lookup("PVTD_CAMPAIGN_CONCURRENCY") {
            self.campaign.concurrency = parse_env("PVTD_CAMPAIGN_CONCURRENCY", &raw)?;
        }
        if let Some(raw) = lookup("PVTD_CAMPAIGN_DEADLINE_SECS") {
            self.campaign.deadline_secs = parse_env("PVTD_CAMPAIGN_DEADLINE_SECS", &raw)?;
        }
        if let Some(raw) = lookup("PVTD_CAMPAIGN_DRY_RUN") {
            self.campaign.dry_run = parse_env("PVTD_CAMPAIGN_DRY_RUN", &raw)?;
        }

        // verify
        if let Some(raw) = lookup("PVTD_VERIFY_MAX_ATTEMPTS") {
            self.verify.max_attempts = parse_env("PVTD_VERIFY_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = lookup("PVTD_VERIFY_INTERVAL_MS") {
            self.verify.interval_ms = parse_env("PVTD_VERIFY_INTERVAL_MS", &raw)?;
        }

        // cluster
        if let Some(raw) = lookup("PVTD_KUBE_CONTEXT") {
            self.cluster.context = Some(raw);
        }
        if let Some(raw) = lookup("PVTD_KUBECONFIG") {
            self.cluster.kubeconfig = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("PVTD_REQUEST_TIMEOUT_SECS") {
            self.cluster.request_timeout_secs = parse_env("PVTD_REQUEST_TIMEOUT_SECS", &raw)?;
        }

        // paths
        if let Some(raw) = lookup("PVTD_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Trim list entries and drop duplicates while keeping configured order.
    fn normalize(&mut self) {
        self.campaign.fragments = normalize_list(&self.campaign.fragments);
        self.campaign.namespaces = normalize_list(&self.campaign.namespaces);
        for namespaces in self.campaign.charts.values_mut() {
            *namespaces = normalize_list(namespaces);
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.campaign.fragments.iter().any(|f| f.is_empty()) {
            return Err(PvtdError::InvalidConfig {
                details: "campaign.fragments must not contain empty entries (an empty fragment matches every claim)"
                    .to_string(),
            });
        }
        if self.campaign.namespaces.iter().any(|n| n.is_empty()) {
            return Err(PvtdError::InvalidConfig {
                details: "campaign.namespaces must not contain empty entries".to_string(),
            });
        }
        if self.campaign.concurrency == 0 {
            return Err(PvtdError::InvalidConfig {
                details: "campaign.concurrency must be >= 1".to_string(),
            });
        }
        if self.verify.max_attempts == 0 {
            return Err(PvtdError::InvalidConfig {
                details: "verify.max_attempts must be >= 1".to_string(),
            });
        }
        for (chart, namespaces) in &self.campaign.charts {
            if namespaces.is_empty() {
                return Err(PvtdError::InvalidConfig {
                    details: format!("campaign.charts.{chart} must list at least one namespace"),
                });
            }
        }
        if self.campaign.deadline_secs > MAX_DEADLINE_SECS {
            return Err(PvtdError::InvalidConfig {
                details: format!(
                    "campaign.deadline_secs must be <= {MAX_DEADLINE_SECS} (got {})",
                    self.campaign.deadline_secs
                ),
            });
        }
        Ok(())
    }
}

/// Trim every entry and drop repeats, keeping first-seen order.
#[must_use]
pub fn normalize_list(values: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| PvtdError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
