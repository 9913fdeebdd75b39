//! # IPA Population Census
//!
//! Periodically counts the population of a FreeIPA directory (groups,
//! active and locked users, staged users pending provisioning review) and
//! reports the counts as tagged metric samples.
//!
//! The core is the directory-query subsystem: an authenticated, paginated
//! search client that reads connection parameters from the system's
//! directory client configuration, follows server-side paged-results
//! cursors until exhaustion, and reduces record streams into categorical
//! counts. The monitoring host is an external collaborator: it supplies the
//! schedule and a [`MetricSink`]; this crate supplies the initialization
//! and per-tick bodies.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ipa_census::{Collector, PluginSettings};
//!
//! let mut settings = PluginSettings::default();
//! settings.apply(&host_entries);
//!
//! // initialization callback: fatal on a rejected bind
//! let mut collector = Collector::bootstrap(&settings, Arc::new(sink)).await?;
//!
//! // periodic callback, driven by the host scheduler
//! collector.collect().await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`config`] - connection, product, and plugin configuration sources
//! - [`session`] - authenticated session and cursor-paged search
//! - [`census`] - population queries and count reduction
//! - [`report`] - metric sample construction and the sink boundary
//! - [`plugin`] - collector lifecycle (bootstrap + collection cycle)
//! - [`error`] - error taxonomy

pub mod census;
pub mod config;
pub mod error;
pub mod plugin;
pub mod report;
pub mod session;

pub use census::{CategoryCounts, PopulationCounter, StagedStatus};
pub use config::{ConfigEntry, ConnectionConfig, IpaConfig, PluginSettings};
pub use error::{CensusError, CensusResult};
pub use plugin::{resolve_vhost, Collector};
pub use report::{MetricReporter, MetricSample, MetricSink, MetricValue};
pub use session::{
    DirectoryBackend, DirectoryRecord, DirectorySession, PageCursor, PagedSearch, SearchPage,
    SearchRequest,
};
