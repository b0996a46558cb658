use crate::error::{CarecallError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// TelephonyConfig
// ---------------------------------------------------------------------------

/// Where dispatch requests go. Without a webhook the server dry-runs calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Re-enter `running` when a record arrives after the queue completed.
    #[serde(default = "default_true")]
    pub auto_resume_on_growth: bool,
    /// Write `.carecall/queue.yaml` after every mutation.
    #[serde(default = "default_true")]
    pub persist: bool,
    /// Seconds to wait after a call ends before dialing the next record.
    /// 0 dials straight away.
    #[serde(default = "default_call_gap_secs")]
    pub call_gap_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_call_gap_secs() -> u64 {
    10
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            auto_resume_on_growth: true,
            persist: true,
            call_gap_secs: default_call_gap_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// BroadcastConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Snapshots buffered per observer before it starts missing some.
    #[serde(default = "default_observer_buffer")]
    pub observer_buffer: usize,
}

fn default_observer_buffer() -> usize {
    32
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            observer_buffer: default_observer_buffer(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telephony: TelephonyConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            server: ServerConfig::default(),
            telephony: TelephonyConfig::default(),
            queue: QueueConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        crate::io::read_yaml(&paths::config_path(root))?.ok_or(CarecallError::NotInitialized)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        crate::io::write_yaml(&paths::config_path(root), self)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Some(url) = &self.telephony.webhook_url {
            if url.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "telephony.webhook_url is set but empty".to_string(),
                });
            } else if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("telephony.webhook_url '{url}' is not an http(s) URL"),
                });
            }
        } else {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no telephony.webhook_url: calls will be dry-run".to_string(),
            });
        }

        if self.telephony.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "telephony.timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.broadcast.observer_buffer == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "broadcast.observer_buffer must be greater than 0".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
