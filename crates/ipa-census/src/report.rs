//! Metric sample construction and dispatch.
//!
//! Counts are mapped onto named metric series, tagged with the virtual host
//! and an optional type instance, and handed to the external sink.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::census::CategoryCounts;

/// A metric payload, discriminated at the call site: either one value or an
/// ordered series carried together in a single sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricValue {
    Single(u64),
    Multi(Vec<u64>),
}

impl MetricValue {
    fn into_values(self) -> Vec<u64> {
        match self {
            MetricValue::Single(value) => vec![value],
            MetricValue::Multi(values) => values,
        }
    }
}

/// One sample handed to the monitoring pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSample {
    /// Metric type, always `ipa_`-prefixed.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Plugin/category tag.
    pub plugin: String,

    /// Virtual host tag; absent when the directory domain is unresolvable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Subcategory tag, e.g. a status label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_instance: Option<String>,

    /// The sample's value(s); a series stays within one sample.
    pub values: Vec<u64>,
}

/// External sink supplied by the host framework.
pub trait MetricSink: Send + Sync {
    fn submit(&self, sample: MetricSample);
}

/// Builds tagged samples and hands them to the sink.
pub struct MetricReporter {
    sink: Arc<dyn MetricSink>,
    vhost: Option<String>,
}

impl MetricReporter {
    pub fn new(sink: Arc<dyn MetricSink>, vhost: Option<String>) -> Self {
        Self { sink, vhost }
    }

    /// Emit one sample for `name`.
    ///
    /// The metric type is `ipa_<name>`; the plugin tag falls back to `name`
    /// when no category is given.
    pub fn dispatch(
        &self,
        value: MetricValue,
        name: &str,
        type_instance: Option<&str>,
        plugin: Option<&str>,
    ) {
        let sample = MetricSample {
            type_name: format!("ipa_{name}"),
            plugin: plugin.unwrap_or(name).to_string(),
            host: self.vhost.clone(),
            type_instance: type_instance.map(str::to_string),
            values: value.into_values(),
        };
        self.sink.submit(sample);
    }

    /// Emit one sample per status label in `counts`, each under the `users`
    /// plugin tag with the label as type instance.
    pub fn dispatch_by_status(&self, name: &str, counts: &CategoryCounts) {
        debug!(name = %name, counts = ?counts, "dispatching status counts");
        for (label, count) in counts.iter() {
            self.dispatch(MetricValue::Single(count), name, Some(label), Some("users"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        samples: Mutex<Vec<MetricSample>>,
    }

    impl MetricSink for RecordingSink {
        fn submit(&self, sample: MetricSample) {
            self.samples.lock().unwrap().push(sample);
        }
    }

    fn reporter(vhost: Option<&str>) -> (MetricReporter, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let reporter = MetricReporter::new(sink.clone(), vhost.map(str::to_string));
        (reporter, sink)
    }

    #[test]
    fn test_scalar_dispatch_produces_one_sample() {
        let (reporter, sink) = reporter(Some("ipa.example.test"));
        reporter.dispatch(MetricValue::Single(42), "groups", None, None);

        let samples = sink.samples.lock().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].type_name, "ipa_groups");
        assert_eq!(samples[0].plugin, "groups");
        assert_eq!(samples[0].host.as_deref(), Some("ipa.example.test"));
        assert_eq!(samples[0].type_instance, None);
        assert_eq!(samples[0].values, vec![42]);
    }

    #[test]
    fn test_series_dispatch_stays_in_one_sample() {
        let (reporter, sink) = reporter(None);
        reporter.dispatch(MetricValue::Multi(vec![1, 2, 3]), "users", None, None);

        let samples = sink.samples.lock().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].values, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_domain_omits_host_tag() {
        let (reporter, sink) = reporter(None);
        reporter.dispatch(MetricValue::Single(7), "groups", None, None);

        let samples = sink.samples.lock().unwrap();
        assert_eq!(samples[0].host, None);
        // the tag disappears from the serialized sample entirely
        let json = serde_json::to_value(&samples[0]).unwrap();
        assert!(json.get("host").is_none());
    }

    #[test]
    fn test_plugin_category_override() {
        let (reporter, sink) = reporter(None);
        reporter.dispatch(MetricValue::Single(9), "users_rate", None, Some("users"));

        let samples = sink.samples.lock().unwrap();
        assert_eq!(samples[0].type_name, "ipa_users_rate");
        assert_eq!(samples[0].plugin, "users");
    }

    #[test]
    fn test_dispatch_by_status_emits_one_sample_per_label() {
        let (reporter, sink) = reporter(Some("ipa.example.test"));
        let mut counts = CategoryCounts::with_labels(&["active", "locked"]);
        counts.increment("active");
        counts.increment("active");
        counts.increment("locked");
        reporter.dispatch_by_status("users", &counts);

        let samples = sink.samples.lock().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].type_name, "ipa_users");
        assert_eq!(samples[0].plugin, "users");
        assert_eq!(samples[0].type_instance.as_deref(), Some("active"));
        assert_eq!(samples[0].values, vec![2]);
        assert_eq!(samples[1].type_instance.as_deref(), Some("locked"));
        assert_eq!(samples[1].values, vec![1]);
    }
}
