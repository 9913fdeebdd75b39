//! Reference polling host for the IPA population census.
//!
//! Stands in for the monitoring daemon: applies plugin settings from the
//! command line, connects once at startup, then invokes the collection
//! cycle at the configured interval and writes each metric sample to
//! stdout as a JSON line. A failed cycle is logged and the next tick
//! proceeds over the same session.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ipa_census::{Collector, ConfigEntry, MetricSample, MetricSink, PluginSettings};

/// Population census agent for a FreeIPA directory
#[derive(Parser, Debug)]
#[command(name = "census-agent", version, about, long_about = None)]
struct Cli {
    /// Polling period in seconds
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Prefix prepended to the resolved domain for host tagging
    #[arg(long, value_name = "PREFIX")]
    domain_prefix: Option<String>,

    /// Product configuration file providing the directory domain
    #[arg(long, value_name = "PATH")]
    ipa_conf: Option<PathBuf>,

    /// Directory client configuration file providing URI and BASE
    #[arg(long, value_name = "PATH")]
    ldap_conf: Option<PathBuf>,

    /// Environment assignments applied before connecting, e.g. the
    /// credential cache location (KRB5CCNAME=/run/ipa/ccache)
    #[arg(long = "set-env", value_name = "VAR=VALUE")]
    set_env: Vec<String>,
}

impl Cli {
    /// Translate the command line into host-style configuration entries so
    /// the settings merge (including its malformed-entry handling) is the
    /// same one the plugin applies.
    fn entries(&self) -> Vec<ConfigEntry> {
        let mut entries = Vec::new();
        if let Some(interval) = self.interval {
            entries.push(ConfigEntry::new("Interval", vec![interval.to_string()]));
        }
        if let Some(prefix) = &self.domain_prefix {
            entries.push(ConfigEntry::new("DomainPrefix", vec![prefix.clone()]));
        }
        if let Some(path) = &self.ipa_conf {
            entries.push(ConfigEntry::new(
                "IpaConf",
                vec![path.display().to_string()],
            ));
        }
        if let Some(path) = &self.ldap_conf {
            entries.push(ConfigEntry::new(
                "LdapConf",
                vec![path.display().to_string()],
            ));
        }
        for assignment in &self.set_env {
            let values = match assignment.split_once('=') {
                Some((variable, value)) => vec![variable.to_string(), value.to_string()],
                None => vec![assignment.clone()],
            };
            entries.push(ConfigEntry::new("SetEnv", values));
        }
        entries
    }
}

/// Writes each sample to stdout as one JSON line.
struct JsonLineSink;

impl MetricSink for JsonLineSink {
    fn submit(&self, sample: MetricSample) {
        match serde_json::to_string(&sample) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(error = %err, "cannot serialize metric sample"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = PluginSettings::default();
    settings.apply(&cli.entries());

    let mut collector = Collector::bootstrap(&settings, Arc::new(JsonLineSink))
        .await
        .context("census initialization failed")?;

    info!(interval_secs = settings.interval.as_secs(), "census agent started");

    let mut ticker = time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("census agent stopping");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(err) = collector.collect().await {
                    warn!(error = %err, "collection tick failed");
                }
            }
        }
    }
}
