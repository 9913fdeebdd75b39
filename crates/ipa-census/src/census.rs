//! Population counting over the accounts tree.
//!
//! Three domain queries, each a thin specialization of the session's paged
//! search, reduced into categorical counts.

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::CensusResult;
use crate::session::DirectorySession;

const GROUP_FILTER: &str = "(objectclass=fasGroup)";
const USER_FILTER: &str = "(objectclass=fasUser)";

const GROUPS_BASE: &str = "cn=groups,cn=accounts";
const USERS_BASE: &str = "cn=users,cn=accounts";
const STAGED_USERS_BASE: &str = "cn=staged users,cn=accounts,cn=provisioning";

const ACCOUNT_LOCK_ATTR: &str = "nsAccountLock";
const STATUS_NOTE_ATTR: &str = "fasStatusNote";

/// Counts per status label, with every known label present from the start
/// so zero-count categories are always reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCounts {
    counts: BTreeMap<&'static str, u64>,
}

impl CategoryCounts {
    /// Initialize all `labels` at zero.
    pub fn with_labels(labels: &[&'static str]) -> Self {
        Self {
            counts: labels.iter().map(|label| (*label, 0)).collect(),
        }
    }

    /// Add one to a label's count. Unknown labels are ignored; callers only
    /// pass labels the counts were initialized with.
    pub fn increment(&mut self, label: &str) {
        if let Some(count) = self.counts.get_mut(label) {
            *count += 1;
        }
    }

    /// The count for a label, zero if unknown.
    pub fn get(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// Iterate labels and counts in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counts.iter().map(|(label, count)| (*label, *count))
    }
}

/// Provisioning status of a staged account, parsed from `fasStatusNote`.
///
/// Parsing never fails: a value outside the known set becomes
/// [`Unrecognized`](StagedStatus::Unrecognized) carrying the raw string, and
/// the caller decides to log and skip. Unknown statuses are expected as the
/// schema evolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedStatus {
    Active,
    SpamcheckAwaiting,
    SpamcheckDenied,
    SpamcheckManual,
    Unrecognized(String),
}

impl StagedStatus {
    /// Every recognized status label, in reporting order.
    pub const LABELS: [&'static str; 4] = [
        "active",
        "spamcheck_awaiting",
        "spamcheck_denied",
        "spamcheck_manual",
    ];

    /// Classify a raw status value.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "active" => StagedStatus::Active,
            "spamcheck_awaiting" => StagedStatus::SpamcheckAwaiting,
            "spamcheck_denied" => StagedStatus::SpamcheckDenied,
            "spamcheck_manual" => StagedStatus::SpamcheckManual,
            other => StagedStatus::Unrecognized(other.to_string()),
        }
    }

    /// The counting label, `None` for unrecognized values.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            StagedStatus::Active => Some("active"),
            StagedStatus::SpamcheckAwaiting => Some("spamcheck_awaiting"),
            StagedStatus::SpamcheckDenied => Some("spamcheck_denied"),
            StagedStatus::SpamcheckManual => Some("spamcheck_manual"),
            StagedStatus::Unrecognized(_) => None,
        }
    }
}

/// Issues the domain queries and reduces record streams to counts.
///
/// Owns the single directory session for the process lifetime.
pub struct PopulationCounter {
    session: DirectorySession,
}

impl PopulationCounter {
    pub fn new(session: DirectorySession) -> Self {
        Self { session }
    }

    /// Number of groups in the accounts tree.
    pub async fn count_groups(&mut self) -> CensusResult<u64> {
        let records = self
            .session
            .search(GROUPS_BASE, GROUP_FILTER, &["dn"])
            .await?;
        Ok(records.len() as u64)
    }

    /// Active and locked user counts.
    ///
    /// A user is locked iff the first `nsAccountLock` value equals `TRUE`;
    /// a missing attribute means active. Every record lands in exactly one
    /// bucket.
    pub async fn count_users(&mut self) -> CensusResult<CategoryCounts> {
        let records = self
            .session
            .search(USERS_BASE, USER_FILTER, &[ACCOUNT_LOCK_ATTR])
            .await?;
        let mut counts = CategoryCounts::with_labels(&["active", "locked"]);
        for record in &records {
            let locked = record.first(ACCOUNT_LOCK_ATTR) == Some("TRUE");
            counts.increment(if locked { "locked" } else { "active" });
        }
        Ok(counts)
    }

    /// Staged-user counts by provisioning status.
    ///
    /// A record without a status note is not yet classified and is skipped;
    /// an unrecognized status is logged and skipped, never an error.
    pub async fn count_staged_users(&mut self) -> CensusResult<CategoryCounts> {
        let records = self
            .session
            .search(STAGED_USERS_BASE, USER_FILTER, &[STATUS_NOTE_ATTR])
            .await?;
        let mut counts = CategoryCounts::with_labels(&StagedStatus::LABELS);
        for record in &records {
            let Some(raw) = record.first(STATUS_NOTE_ATTR) else {
                continue;
            };
            match StagedStatus::parse(raw) {
                StagedStatus::Unrecognized(value) => {
                    warn!(status = %value, "skipping staged account with unknown status");
                }
                status => {
                    if let Some(label) = status.label() {
                        counts.increment(label);
                    }
                }
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::fake::ScriptedBackend;
    use crate::session::DirectoryRecord;

    fn counter_with_page(page: Vec<DirectoryRecord>) -> PopulationCounter {
        let backend = ScriptedBackend::with_pages(vec![page]);
        PopulationCounter::new(DirectorySession::new(
            Box::new(backend),
            "dc=example,dc=test",
        ))
    }

    #[tokio::test]
    async fn test_count_groups_is_record_count() {
        let page = (0..5)
            .map(|i| DirectoryRecord::new().with("dn", [format!("cn=g{i}")]))
            .collect();
        let mut counter = counter_with_page(page);
        assert_eq!(counter.count_groups().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_count_users_buckets_every_record() {
        let page = vec![
            DirectoryRecord::new(),
            DirectoryRecord::new().with(ACCOUNT_LOCK_ATTR, ["FALSE"]),
            DirectoryRecord::new().with(ACCOUNT_LOCK_ATTR, ["TRUE"]),
        ];
        let mut counter = counter_with_page(page);
        let counts = counter.count_users().await.unwrap();
        assert_eq!(counts.get("active"), 2);
        assert_eq!(counts.get("locked"), 1);
    }

    #[tokio::test]
    async fn test_count_staged_users_skips_unclassified() {
        let page = vec![
            DirectoryRecord::new().with(STATUS_NOTE_ATTR, ["active"]),
            DirectoryRecord::new(),
            DirectoryRecord::new().with(STATUS_NOTE_ATTR, ["bogus"]),
            DirectoryRecord::new().with(STATUS_NOTE_ATTR, ["spamcheck_manual"]),
        ];
        let mut counter = counter_with_page(page);
        let counts = counter.count_staged_users().await.unwrap();
        assert_eq!(counts.get("active"), 1);
        assert_eq!(counts.get("spamcheck_awaiting"), 0);
        assert_eq!(counts.get("spamcheck_denied"), 0);
        assert_eq!(counts.get("spamcheck_manual"), 1);
        // skipped records are excluded from the sum, not miscounted
        assert_eq!(counts.iter().map(|(_, c)| c).sum::<u64>(), 2);
    }

    #[tokio::test]
    async fn test_count_staged_users_skips_empty_status() {
        let page = vec![DirectoryRecord::new().with(STATUS_NOTE_ATTR, Vec::<String>::new())];
        let mut counter = counter_with_page(page);
        let counts = counter.count_staged_users().await.unwrap();
        assert_eq!(counts.iter().map(|(_, c)| c).sum::<u64>(), 0);
    }

    #[test]
    fn test_staged_status_parse_roundtrip() {
        for label in StagedStatus::LABELS {
            assert_eq!(StagedStatus::parse(label).label(), Some(label));
        }
        let unknown = StagedStatus::parse("spamcheck_extra");
        assert_eq!(
            unknown,
            StagedStatus::Unrecognized("spamcheck_extra".to_string())
        );
        assert_eq!(unknown.label(), None);
    }

    #[test]
    fn test_zero_counts_are_reported() {
        let counts = CategoryCounts::with_labels(&StagedStatus::LABELS);
        let labels: Vec<&str> = counts.iter().map(|(label, _)| label).collect();
        assert_eq!(
            labels,
            vec![
                "active",
                "spamcheck_awaiting",
                "spamcheck_denied",
                "spamcheck_manual"
            ]
        );
        assert!(counts.iter().all(|(_, count)| count == 0));
    }
}
