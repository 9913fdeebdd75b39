//! Shared fakes for integration tests: a scripted directory backend and a
//! recording metric sink.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ipa_census::{
    CensusError, CensusResult, DirectoryBackend, DirectoryRecord, MetricSample, MetricSink,
    PageCursor, SearchPage, SearchRequest,
};

/// Serves scripted pages per search base; cursors are page indexes in ASCII.
pub struct DirectoryFixture {
    routes: Vec<(String, Vec<Vec<DirectoryRecord>>)>,
    fail_bases: Vec<String>,
    pub seen: Arc<Mutex<Vec<SearchRequest>>>,
}

impl DirectoryFixture {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            fail_bases: Vec::new(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve `pages` for searches whose base starts with `base_prefix`.
    pub fn route(mut self, base_prefix: &str, pages: Vec<Vec<DirectoryRecord>>) -> Self {
        self.routes.push((base_prefix.to_string(), pages));
        self
    }

    /// Fail every search whose base starts with `base_prefix`.
    pub fn failing(mut self, base_prefix: &str) -> Self {
        self.fail_bases.push(base_prefix.to_string());
        self
    }
}

#[async_trait]
impl DirectoryBackend for DirectoryFixture {
    async fn search_page(
        &mut self,
        request: &SearchRequest,
        cursor: &PageCursor,
        _page_size: i32,
    ) -> CensusResult<SearchPage> {
        self.seen.lock().unwrap().push(request.clone());

        if self
            .fail_bases
            .iter()
            .any(|base| request.base.starts_with(base.as_str()))
        {
            return Err(CensusError::search_failed(format!(
                "scripted failure under {}",
                request.base
            )));
        }

        let pages = self
            .routes
            .iter()
            .find(|(prefix, _)| request.base.starts_with(prefix.as_str()))
            .map(|(_, pages)| pages.clone())
            .unwrap_or_default();
        let index: usize = if cursor.is_empty() {
            0
        } else {
            String::from_utf8_lossy(cursor).parse().unwrap()
        };
        let records = pages.get(index).cloned().unwrap_or_default();
        let cursor = if index + 1 < pages.len() {
            (index + 1).to_string().into_bytes()
        } else {
            PageCursor::new()
        };
        Ok(SearchPage { records, cursor })
    }
}

/// Captures every submitted sample for assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub samples: Mutex<Vec<MetricSample>>,
}

impl MetricSink for RecordingSink {
    fn submit(&self, sample: MetricSample) {
        self.samples.lock().unwrap().push(sample);
    }
}
