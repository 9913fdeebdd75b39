//! Configuration sources
//!
//! Three externally-owned inputs feed the collector: the directory client
//! configuration file (`URI`/`BASE`), the product configuration file
//! (the `domain` under `[global]`), and the host-supplied plugin settings.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{CensusError, CensusResult};

/// Default polling period in seconds.
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Default prefix prepended to the resolved domain for host tagging.
pub const DEFAULT_DOMAIN_PREFIX: &str = "ipa.";

/// Default product configuration file path.
pub const DEFAULT_IPA_CONF: &str = "/etc/ipa/default.conf";

/// Default directory client configuration file path.
pub const DEFAULT_LDAP_CONF: &str = "/etc/openldap/ldap.conf";

fn line_pattern() -> &'static Regex {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    LINE_RE.get_or_init(|| Regex::new(r"^([A-Z_]+)\s+(.+)$").expect("hardcoded pattern is valid"))
}

/// Connection parameters parsed from the directory client configuration file.
///
/// The file format is externally owned, so parsing is permissive: a line
/// either matches `KEY VALUE` (key: uppercase letters and underscores) or is
/// ignored. Later duplicate keys overwrite earlier ones. Required keys are
/// only validated when the session is constructed, not at load time.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    values: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Load the configuration file at `path`.
    ///
    /// Fails only when the file itself cannot be read.
    pub fn load(path: &Path) -> CensusResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| CensusError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parse configuration text into a key/value mapping.
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();
        for line in text.lines() {
            if let Some(caps) = line_pattern().captures(line.trim()) {
                values.insert(caps[1].to_string(), caps[2].to_string());
            }
        }
        Self { values }
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up a key that must be present.
    pub fn require(&self, key: &str) -> CensusResult<&str> {
        self.get(key).ok_or_else(|| CensusError::ConfigKeyMissing {
            key: key.to_string(),
        })
    }
}

/// The `[global]` section of the product configuration file.
///
/// Treated as a simple key/value lookup; a missing or unreadable file yields
/// an empty mapping rather than an error, so host tagging degrades to
/// "no host tag" instead of failing collection.
#[derive(Debug, Clone, Default)]
pub struct IpaConfig {
    values: HashMap<String, String>,
}

impl IpaConfig {
    /// Read the `[global]` section from the file at `path`.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "product config not readable");
                Self::default()
            }
        }
    }

    /// Parse INI-style text, keeping only `[global]` keys.
    pub fn parse(text: &str) -> Self {
        let mut values = HashMap::new();
        let mut in_global = false;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_global = section.trim() == "global";
                continue;
            }
            if !in_global {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }
        Self { values }
    }

    /// The directory domain, if configured.
    pub fn domain(&self) -> Option<&str> {
        self.values.get("domain").map(String::as_str)
    }
}

/// One host-supplied plugin configuration item: a key and its value list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub values: Vec<String>,
}

impl ConfigEntry {
    pub fn new(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            values,
        }
    }
}

/// Plugin settings, defaults merged with host-supplied overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettings {
    /// Polling period between collection cycles.
    pub interval: Duration,

    /// Prefix prepended to the resolved domain for host tagging.
    pub domain_prefix: String,

    /// Product configuration file providing the `domain` value.
    pub ipa_conf: PathBuf,

    /// Directory client configuration file providing `URI` and `BASE`.
    pub ldap_conf: PathBuf,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            domain_prefix: DEFAULT_DOMAIN_PREFIX.to_string(),
            ipa_conf: PathBuf::from(DEFAULT_IPA_CONF),
            ldap_conf: PathBuf::from(DEFAULT_LDAP_CONF),
        }
    }
}

impl PluginSettings {
    /// Merge host-supplied entries into the settings.
    ///
    /// An unrecognized key or a malformed value logs a warning and leaves
    /// the current setting untouched; configuration never aborts.
    pub fn apply(&mut self, entries: &[ConfigEntry]) {
        for entry in entries {
            debug!(key = %entry.key, values = ?entry.values, "plugin config entry");
            if let Err(reason) = self.apply_entry(entry) {
                warn!(
                    key = %entry.key,
                    values = ?entry.values,
                    reason = %reason,
                    "invalid plugin configuration entry, skipping"
                );
            }
        }
    }

    fn apply_entry(&mut self, entry: &ConfigEntry) -> Result<(), String> {
        if entry.key == "SetEnv" {
            let [variable, value] = entry.values.as_slice() else {
                return Err("expected exactly two values: variable and value".to_string());
            };
            // The GSSAPI credential cache location is environment-driven,
            // so assignments must land before the session connects.
            env::set_var(variable, value);
            return Ok(());
        }

        let [value] = entry.values.as_slice() else {
            return Err("expected exactly one value".to_string());
        };
        match entry.key.as_str() {
            "Interval" => {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| format!("'{value}' is not a whole number of seconds"))?;
                if secs == 0 {
                    return Err("interval must be positive".to_string());
                }
                self.interval = Duration::from_secs(secs);
            }
            "DomainPrefix" => self.domain_prefix = value.clone(),
            "IpaConf" => self.ipa_conf = PathBuf::from(value),
            "LdapConf" => self.ldap_conf = PathBuf::from(value),
            _ => return Err("unrecognized option".to_string()),
        }
        Ok(())
    }
}
