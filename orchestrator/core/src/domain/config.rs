// Copyright (c) 2026 Colony Contributors
// SPDX-License-Identifier: AGPL-3.0

// Coordinator Configuration Types
//
// Defines the configuration schema for a colony coordinator, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Filesystem roots for agent sandboxes, lifecycle records and the registry artifact
// - Channel monitor strategy and two-speed polling intervals
// - Mailbox router tick
// - Agent-side channel wait policy
// - External thinking command

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const API_VERSION: &str = "colony.dev/v1";
pub const CONFIG_KIND: &str = "CoordinatorConfig";

/// Top-level Kubernetes-style coordinator configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfigManifest {
    /// API version (must be "colony.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CoordinatorConfig")
    pub kind: String,

    /// Coordinator metadata
    pub metadata: ManifestMetadata,

    /// Coordinator configuration specification
    #[serde(default)]
    pub spec: CoordinatorConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable coordinator name
    pub name: String,

    /// Optional: Configuration version for tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Coordinator configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfigSpec {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub thinking: ThinkingConfig,
}

/// Filesystem roots. Unset entries are derived from `data_dir`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_file: Option<PathBuf>,
}

/// Fully resolved filesystem roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub agents_dir: PathBuf,
    pub state_dir: PathBuf,
    pub registry_file: PathBuf,
}

impl PathsConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(".colony"))
                .unwrap_or_else(|| PathBuf::from(".colony"))
        })
    }

    pub fn resolve(&self) -> ResolvedPaths {
        let data_dir = self.data_dir();
        ResolvedPaths {
            agents_dir: self
                .agents_dir
                .clone()
                .unwrap_or_else(|| data_dir.join("agents")),
            state_dir: self
                .state_dir
                .clone()
                .unwrap_or_else(|| data_dir.join("state")),
            registry_file: self
                .registry_file
                .clone()
                .unwrap_or_else(|| data_dir.join("registry.json")),
        }
    }
}

/// How the channel monitor learns about file changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStrategy {
    /// Filesystem notifications when available, polling otherwise
    Auto,
    /// Filesystem notifications only
    Event,
    /// Adaptive polling only
    Poll,
}

impl FromStr for MonitorStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(MonitorStrategy::Auto),
            "event" => Ok(MonitorStrategy::Event),
            "poll" => Ok(MonitorStrategy::Poll),
            other => Err(format!("unknown monitor strategy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_strategy")]
    pub strategy: MonitorStrategy,

    /// Tick while any channel has a request pending or in flight
    #[serde(with = "humantime_serde", default = "default_busy_interval")]
    pub busy_interval: Duration,

    /// Tick while every channel is idle
    #[serde(with = "humantime_serde", default = "default_idle_interval")]
    pub idle_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(with = "humantime_serde", default = "default_router_tick")]
    pub tick_interval: Duration,
}

/// Agent-side wait policy for the channel client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Give up waiting for a response after this long; unset waits forever
    #[serde(with = "humantime_serde", default, skip_serializing_if = "Option::is_none")]
    pub response_timeout: Option<Duration>,

    #[serde(with = "humantime_serde", default = "default_busy_interval")]
    pub poll_interval: Duration,
}

/// External thinking subsystem invoked once per channel request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThinkingConfig {
    /// Program and arguments; the request payload is written to stdin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

fn default_strategy() -> MonitorStrategy {
    MonitorStrategy::Auto
}

fn default_busy_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_idle_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_router_tick() -> Duration {
    Duration::from_secs(1)
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            busy_interval: default_busy_interval(),
            idle_interval: default_idle_interval(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_router_tick(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            response_timeout: None,
            poll_interval: default_busy_interval(),
        }
    }
}

impl Default for CoordinatorConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "colony".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
            },
            spec: CoordinatorConfigSpec::default(),
        }
    }
}

impl CoordinatorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        std::fs::write(path, self.to_yaml_str()?)?;
        Ok(())
    }

    pub fn to_yaml_str(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. COLONY_CONFIG_PATH environment variable
    /// 2. ./colony-config.yaml (working directory)
    /// 3. ~/.colony/config.yaml (user home)
    /// 4. /etc/colony/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("COLONY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./colony-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".colony").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/colony/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (Fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("COLONY_DATA_DIR") {
            tracing::info!("Environment override: COLONY_DATA_DIR={}", val);
            self.spec.paths.data_dir = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("COLONY_MONITOR_STRATEGY") {
            match val.parse::<MonitorStrategy>() {
                Ok(strategy) => {
                    tracing::info!("Environment override: COLONY_MONITOR_STRATEGY={}", val);
                    self.spec.monitor.strategy = strategy;
                }
                Err(e) => {
                    tracing::warn!("Invalid value for COLONY_MONITOR_STRATEGY: {}. Ignoring.", e);
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != CONFIG_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, CONFIG_KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let monitor = &self.spec.monitor;
        if monitor.busy_interval.is_zero() || monitor.idle_interval.is_zero() {
            anyhow::bail!("spec.monitor intervals must be greater than zero");
        }
        if monitor.busy_interval > monitor.idle_interval {
            anyhow::bail!(
                "spec.monitor.busy_interval ({:?}) must not exceed idle_interval ({:?})",
                monitor.busy_interval,
                monitor.idle_interval
            );
        }

        if self.spec.router.tick_interval.is_zero() {
            anyhow::bail!("spec.router.tick_interval must be greater than zero");
        }

        if self.spec.channel.poll_interval.is_zero() {
            anyhow::bail!("spec.channel.poll_interval must be greater than zero");
        }

        if let Some(command) = &self.spec.thinking.command {
            if command.is_empty() || command[0].trim().is_empty() {
                anyhow::bail!("spec.thinking.command must name a program when set");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = CoordinatorConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, CONFIG_KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.monitor.strategy, MonitorStrategy::Auto);
        assert_eq!(manifest.spec.monitor.busy_interval, Duration::from_millis(50));
        assert!(manifest.spec.channel.response_timeout.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing_with_durations() {
        let yaml = r#"
apiVersion: colony.dev/v1
kind: CoordinatorConfig
metadata:
  name: test-coordinator
spec:
  paths:
    data_dir: /var/lib/colony
    registry_file: /run/colony/registry.json
  monitor:
    strategy: poll
    busy_interval: 20ms
    idle_interval: 2s
  channel:
    response_timeout: 5m
  thinking:
    command: ["thinker", "--fast"]
"#;
        let manifest = CoordinatorConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "test-coordinator");
        assert_eq!(manifest.spec.monitor.strategy, MonitorStrategy::Poll);
        assert_eq!(manifest.spec.monitor.busy_interval, Duration::from_millis(20));
        assert_eq!(manifest.spec.monitor.idle_interval, Duration::from_secs(2));
        assert_eq!(manifest.spec.router.tick_interval, Duration::from_secs(1));
        assert_eq!(manifest.spec.channel.response_timeout, Some(Duration::from_secs(300)));

        let paths = manifest.spec.paths.resolve();
        assert_eq!(paths.agents_dir, PathBuf::from("/var/lib/colony/agents"));
        assert_eq!(paths.state_dir, PathBuf::from("/var/lib/colony/state"));
        assert_eq!(paths.registry_file, PathBuf::from("/run/colony/registry.json"));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut manifest = CoordinatorConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = CONFIG_KIND.to_string();

        manifest.spec.monitor.busy_interval = Duration::from_secs(5);
        assert!(manifest.validate().is_err());
        manifest.spec.monitor.busy_interval = Duration::from_millis(50);

        manifest.spec.thinking.command = Some(vec![]);
        assert!(manifest.validate().is_err());
        manifest.spec.thinking.command = Some(vec!["cat".to_string()]);
        assert!(manifest.validate().is_ok());
    }
}
