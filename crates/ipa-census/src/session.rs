//! Directory session: one authenticated connection and cursor-paged search.
//!
//! The session performs a SASL/GSSAPI bind as the invoking process's
//! credential identity and exposes a paginated search primitive that follows
//! server-side paged-results cursors until exhaustion. Pagination is driven
//! through [`PagedSearch`], a lazy, finite, non-restartable page iterator
//! over the [`DirectoryBackend`] seam; [`LdapBackend`] is the production
//! backend.

use std::collections::HashMap;

use async_trait::async_trait;
use ldap3::controls::{Control, ControlType, PagedResults};
use ldap3::{Ldap, LdapConnAsync, Scope, SearchEntry};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::{CensusError, CensusResult};

/// Page size requested from the directory server.
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

/// Opaque pagination cursor returned by the directory server.
///
/// Empty means "no more pages". Any returned value must be threaded through
/// the next request unchanged.
pub type PageCursor = Vec<u8>;

/// One search, fully specified: absolute base DN, filter, and the attribute
/// selection (empty = all attributes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub filter: String,
    pub attrs: Vec<String>,
}

/// One page of results plus the cursor for the next request.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub records: Vec<DirectoryRecord>,
    pub cursor: PageCursor,
}

/// A directory entry reduced to its attribute mapping; the DN is discarded.
///
/// Directory attributes are multi-valued and ordered. An absent attribute is
/// distinct from an attribute present with zero values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryRecord {
    attrs: HashMap<String, Vec<String>>,
}

impl DirectoryRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute using the builder pattern.
    pub fn with<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Check if an attribute exists, even with zero values.
    pub fn has(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// All values of an attribute, in server order.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attrs.get(name).map(Vec::as_slice)
    }

    /// The first value of an attribute, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

impl From<SearchEntry> for DirectoryRecord {
    fn from(entry: SearchEntry) -> Self {
        let mut attrs = entry.attrs;
        // Binary attribute values are carried lossily; the census only
        // classifies on textual attributes.
        for (name, values) in entry.bin_attrs {
            attrs.entry(name).or_default().extend(
                values
                    .into_iter()
                    .map(|v| String::from_utf8_lossy(&v).into_owned()),
            );
        }
        Self { attrs }
    }
}

/// One-page-at-a-time search capability of a directory server.
///
/// The production implementation is [`LdapBackend`]; tests substitute
/// scripted fakes.
#[async_trait]
pub trait DirectoryBackend: Send {
    /// Issue a single paged search request carrying `cursor` and return the
    /// resulting page together with the server's next cursor (empty when
    /// pagination is exhausted, including when the server ignored paging and
    /// returned everything at once).
    async fn search_page(
        &mut self,
        request: &SearchRequest,
        cursor: &PageCursor,
        page_size: i32,
    ) -> CensusResult<SearchPage>;
}

/// Lazy, finite, non-restartable sequence of record pages.
///
/// The pagination cursor is internal iterator state: it starts empty, is
/// threaded unchanged between requests, and an empty cursor in a response
/// terminates the sequence.
pub struct PagedSearch<'a> {
    backend: &'a mut dyn DirectoryBackend,
    request: SearchRequest,
    page_size: i32,
    cursor: PageCursor,
    done: bool,
}

impl<'a> PagedSearch<'a> {
    /// Start a paged search; no request is issued until the first
    /// [`next_page`](Self::next_page) call.
    pub fn new(backend: &'a mut dyn DirectoryBackend, request: SearchRequest, page_size: i32) -> Self {
        Self {
            backend,
            request,
            page_size,
            cursor: PageCursor::new(),
            done: false,
        }
    }

    /// Fetch the next page, or `None` once the server reported the cursor
    /// exhausted. A failed page fetch propagates and leaves the iterator
    /// unusable.
    pub async fn next_page(&mut self) -> CensusResult<Option<Vec<DirectoryRecord>>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .backend
            .search_page(&self.request, &self.cursor, self.page_size)
            .await?;
        self.cursor = page.cursor;
        if self.cursor.is_empty() {
            self.done = true;
        }
        Ok(Some(page.records))
    }
}

/// Production backend over an ldap3 connection.
pub struct LdapBackend {
    ldap: Ldap,
}

impl LdapBackend {
    /// Connect to `endpoint` and perform a SASL/GSSAPI bind with an empty
    /// authorization identity, i.e. as the invoking process's credential
    /// identity. The connection speaks protocol version 3.
    pub async fn connect(endpoint: &str) -> CensusResult<Self> {
        let url = Url::parse(endpoint).map_err(|err| CensusError::InvalidEndpoint {
            uri: endpoint.to_string(),
            message: err.to_string(),
        })?;
        let server_fqdn = url
            .host_str()
            .ok_or_else(|| CensusError::InvalidEndpoint {
                uri: endpoint.to_string(),
                message: "endpoint has no host".to_string(),
            })?
            .to_string();

        debug!(endpoint = %endpoint, "connecting to directory server");
        let (conn, mut ldap) = LdapConnAsync::new(endpoint).await.map_err(|err| {
            CensusError::connection_failed_with_source(
                format!("cannot reach directory server at {endpoint}"),
                err,
            )
        })?;
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!(error = %err, "directory connection driver error");
            }
        });

        ldap.sasl_gssapi_bind(&server_fqdn)
            .await
            .map_err(|err| {
                CensusError::authentication_failed_with_source(
                    format!("GSSAPI bind to {server_fqdn} failed"),
                    err,
                )
            })?
            .success()
            .map_err(|err| {
                CensusError::authentication_failed_with_source(
                    format!("GSSAPI bind to {server_fqdn} rejected"),
                    err,
                )
            })?;

        info!(endpoint = %endpoint, "directory bind established");
        Ok(Self { ldap })
    }
}

#[async_trait]
impl DirectoryBackend for LdapBackend {
    async fn search_page(
        &mut self,
        request: &SearchRequest,
        cursor: &PageCursor,
        page_size: i32,
    ) -> CensusResult<SearchPage> {
        // Non-critical: a server may ignore paging and answer in one page.
        let control = PagedResults {
            size: page_size,
            cookie: cursor.clone(),
        };
        let attrs: Vec<&str> = request.attrs.iter().map(String::as_str).collect();
        let (entries, result) = self
            .ldap
            .with_controls(control)
            .search(&request.base, Scope::Subtree, &request.filter, attrs)
            .await
            .map_err(|err| {
                CensusError::search_failed_with_source(
                    format!("search under {} failed", request.base),
                    err,
                )
            })?
            .success()
            .map_err(|err| {
                CensusError::search_failed_with_source(
                    format!("search under {} returned an error", request.base),
                    err,
                )
            })?;

        let records = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(DirectoryRecord::from)
            .collect();

        // A missing response control ends pagination.
        let mut next = PageCursor::new();
        for Control(control_type, raw) in result.ctrls {
            if matches!(control_type, Some(ControlType::PagedResults)) {
                next = raw.parse::<PagedResults>().cookie;
                break;
            }
        }

        Ok(SearchPage {
            records,
            cursor: next,
        })
    }
}

/// One authenticated directory connection plus the root DN suffix appended
/// to every search base.
///
/// The session is created once at startup and reused for the full polling
/// lifetime; a search failure does not close it.
pub struct DirectorySession {
    backend: Box<dyn DirectoryBackend>,
    root_base: String,
}

impl DirectorySession {
    /// Connect using the first whitespace-delimited `URI` endpoint and the
    /// `BASE` root suffix from the connection configuration.
    ///
    /// A rejected bind is fatal to startup; there is no retry.
    pub async fn connect(config: &ConnectionConfig) -> CensusResult<Self> {
        let uri = config.require("URI")?;
        let endpoint = uri
            .split_whitespace()
            .next()
            .ok_or_else(|| CensusError::InvalidEndpoint {
                uri: uri.to_string(),
                message: "no endpoint in URI list".to_string(),
            })?;
        let root_base = config.require("BASE")?.to_string();
        let backend = LdapBackend::connect(endpoint).await?;
        Ok(Self::new(Box::new(backend), root_base))
    }

    /// Build a session over an already-connected backend.
    pub fn new(backend: Box<dyn DirectoryBackend>, root_base: impl Into<String>) -> Self {
        Self {
            backend,
            root_base: root_base.into(),
        }
    }

    /// Search the subtree under `base` (relative, the root suffix is
    /// appended) and accumulate every page of results in server order.
    pub async fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: &[&str],
    ) -> CensusResult<Vec<DirectoryRecord>> {
        let request = SearchRequest {
            base: format!("{},{}", base, self.root_base),
            filter: filter.to_string(),
            attrs: attrs.iter().map(|a| a.to_string()).collect(),
        };
        debug!(base = %request.base, filter = %request.filter, "paged search");

        let mut pages = PagedSearch::new(self.backend.as_mut(), request, DEFAULT_PAGE_SIZE);
        let mut records = Vec::new();
        while let Some(page) = pages.next_page().await? {
            records.extend(page);
        }
        Ok(records)
    }
}
