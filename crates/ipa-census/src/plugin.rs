//! Collector lifecycle: bootstrap once, then one collection cycle per tick.
//!
//! The host framework supplies the schedule and the sample sink; this module
//! supplies the initialization body (connect) and the periodic body (count
//! and dispatch). The collector is an explicit context object passed into
//! every invocation; there is no ambient global state.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::census::PopulationCounter;
use crate::config::{ConnectionConfig, IpaConfig, PluginSettings};
use crate::error::CensusResult;
use crate::report::{MetricReporter, MetricSink, MetricValue};
use crate::session::DirectorySession;

/// Virtual host tag: domain prefix plus the resolved directory domain, or
/// `None` when the product config does not provide a domain.
pub fn resolve_vhost(prefix: &str, ipa: &IpaConfig) -> Option<String> {
    ipa.domain().map(|domain| format!("{prefix}{domain}"))
}

/// Process-wide collector state: the open directory session (via the
/// counter) and the reporter carrying the resolved virtual host.
///
/// Created once at startup and reused for every scheduled invocation until
/// process exit. A failed search does not close the session; the next
/// scheduled tick simply tries again over the same connection.
pub struct Collector {
    counter: PopulationCounter,
    reporter: MetricReporter,
}

impl Collector {
    /// Initialization body: read the connection and product configuration,
    /// resolve the virtual host, connect and bind the session.
    ///
    /// Any failure here is fatal; without a bound session no metrics can
    /// ever be produced.
    pub async fn bootstrap(
        settings: &PluginSettings,
        sink: Arc<dyn MetricSink>,
    ) -> CensusResult<Self> {
        let connection = ConnectionConfig::load(&settings.ldap_conf)?;
        let ipa = IpaConfig::load(&settings.ipa_conf);
        let vhost = resolve_vhost(&settings.domain_prefix, &ipa);

        let session = DirectorySession::connect(&connection).await?;
        info!(vhost = ?vhost, "census collector ready");

        Ok(Self::new(
            PopulationCounter::new(session),
            MetricReporter::new(sink, vhost),
        ))
    }

    /// Assemble a collector from already-built parts.
    pub fn new(counter: PopulationCounter, reporter: MetricReporter) -> Self {
        Self { counter, reporter }
    }

    /// One collection cycle.
    ///
    /// Dispatch is eager per query: samples of completed queries are already
    /// with the sink when a later query fails, and nothing computed after
    /// the failure is emitted. The error propagates to the host; its next
    /// tick is the retry.
    #[instrument(skip(self))]
    pub async fn collect(&mut self) -> CensusResult<()> {
        let groups = self.counter.count_groups().await?;
        self.reporter
            .dispatch(MetricValue::Single(groups), "groups", None, None);

        let staged = self.counter.count_staged_users().await?;
        self.reporter.dispatch_by_status("staged_users", &staged);

        let users = self.counter.count_users().await?;
        self.reporter.dispatch_by_status("users", &users);
        self.reporter.dispatch(
            MetricValue::Single(users.get("active")),
            "users_rate",
            None,
            Some("users"),
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vhost_prefixes_domain() {
        let ipa = IpaConfig::parse("[global]\ndomain = example.test\n");
        assert_eq!(
            resolve_vhost("ipa.", &ipa),
            Some("ipa.example.test".to_string())
        );
    }

    #[test]
    fn test_vhost_absent_without_domain() {
        let ipa = IpaConfig::parse("[global]\nrealm = EXAMPLE.TEST\n");
        assert_eq!(resolve_vhost("ipa.", &ipa), None);
    }
}
