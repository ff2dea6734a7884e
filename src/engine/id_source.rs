//! Paginated identifier source for one type-run.
//!
//! Workers share one source per type filter; the buffer hands out each
//! identifier exactly once, and a page-fetch lock keeps concurrent
//! `pop()` calls from issuing duplicate index queries.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{gauge, histogram};
use tracing::{error, info};

use crate::domain::{ObjectId, TypeFilter};
use crate::repos::SearchIndex;

use super::lock::mutex_lock;

const SOURCE: &str = "engine::id_source";
const METRIC_INDEX_FETCH_MS: &str = "rinfresco_index_fetch_ms";
const METRIC_BUFFER_LEN: &str = "rinfresco_id_buffer_len";

pub struct IdSource {
    index: Arc<dyn SearchIndex>,
    filter: TypeFilter,
    page_size: u64,
    buffer: Mutex<VecDeque<ObjectId>>,
    fetch: tokio::sync::Mutex<FetchState>,
}

#[derive(Debug, Default)]
struct FetchState {
    offset: u64,
    total_matching: Option<u64>,
    pages_fetched: u64,
    exhausted: bool,
}

/// Point-in-time view of a source's paging progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub total_matching: Option<u64>,
    pub pages_fetched: u64,
    pub offset: u64,
}

impl IdSource {
    pub fn new(index: Arc<dyn SearchIndex>, filter: TypeFilter, page_size: u64) -> Self {
        Self {
            index,
            filter,
            page_size,
            buffer: Mutex::new(VecDeque::new()),
            fetch: tokio::sync::Mutex::new(FetchState::default()),
        }
    }

    /// Remove and return the next identifier, fetching the next index
    /// page when the buffer runs dry. Returns `None` once the filter is
    /// exhausted; that is the termination signal for a worker's loop.
    pub async fn pop(&self) -> Option<ObjectId> {
        loop {
            if let Some(id) = self.dequeue() {
                return Some(id);
            }

            let mut state = self.fetch.lock().await;
            // Another worker may have refilled while this one waited on
            // the fetch lock.
            if let Some(id) = self.dequeue() {
                return Some(id);
            }
            if state.exhausted {
                return None;
            }
            if let Some(total) = state.total_matching {
                if state.offset >= total {
                    state.exhausted = true;
                    return None;
                }
            }

            let fetch_started_at = Instant::now();
            let page = match self
                .index
                .fetch_ids(&self.filter, state.offset, self.page_size)
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    error!(
                        target = "rinfresco::id_source",
                        filter = %self.filter,
                        offset = state.offset,
                        error = %err,
                        "index fetch failed; ending this type-run early"
                    );
                    state.exhausted = true;
                    return None;
                }
            };
            histogram!(METRIC_INDEX_FETCH_MS)
                .record(fetch_started_at.elapsed().as_secs_f64() * 1000.0);

            if state.total_matching.is_none() {
                state.total_matching = Some(page.total_matching);
                info!(
                    target = "rinfresco::id_source",
                    filter = %self.filter,
                    total_matching = page.total_matching,
                    "type-run scope resolved"
                );
            }

            // Advance unconditionally, even past a short page, so the
            // offset/total comparison signals exhaustion next time
            // around instead of re-querying the same window.
            state.offset += self.page_size;
            state.pages_fetched += 1;

            if page.ids.is_empty() {
                state.exhausted = true;
                return None;
            }
            self.enqueue(page.ids);
        }
    }

    pub async fn snapshot(&self) -> SourceSnapshot {
        let state = self.fetch.lock().await;
        SourceSnapshot {
            total_matching: state.total_matching,
            pages_fetched: state.pages_fetched,
            offset: state.offset,
        }
    }

    fn dequeue(&self) -> Option<ObjectId> {
        let mut buffer = mutex_lock(&self.buffer, SOURCE, "dequeue");
        let id = buffer.pop_front();
        gauge!(METRIC_BUFFER_LEN).set(buffer.len() as f64);
        id
    }

    fn enqueue(&self, ids: Vec<ObjectId>) {
        let mut buffer = mutex_lock(&self.buffer, SOURCE, "enqueue");
        buffer.extend(ids);
        gauge!(METRIC_BUFFER_LEN).set(buffer.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::domain::IdPage;
    use crate::repos::IndexError;

    use super::*;

    struct FixedIndex {
        ids: Vec<ObjectId>,
        reported_total: Option<u64>,
        fetches: AtomicUsize,
    }

    impl FixedIndex {
        fn new(ids: &[&str]) -> Self {
            Self {
                ids: ids.iter().map(|id| ObjectId::from(*id)).collect(),
                reported_total: None,
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchIndex for FixedIndex {
        async fn fetch_ids(
            &self,
            _filter: &TypeFilter,
            offset: u64,
            page_size: u64,
        ) -> Result<IdPage, IndexError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let start = (offset as usize).min(self.ids.len());
            let end = (start + page_size as usize).min(self.ids.len());
            Ok(IdPage {
                ids: self.ids[start..end].to_vec(),
                total_matching: self
                    .reported_total
                    .unwrap_or(self.ids.len() as u64),
            })
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl SearchIndex for FailingIndex {
        async fn fetch_ids(
            &self,
            _filter: &TypeFilter,
            _offset: u64,
            _page_size: u64,
        ) -> Result<IdPage, IndexError> {
            Err(IndexError::from_query("index offline"))
        }
    }

    fn source_over(index: Arc<FixedIndex>, page_size: u64) -> IdSource {
        IdSource::new(index, TypeFilter::from("GenericWork"), page_size)
    }

    #[tokio::test]
    async fn short_page_signals_exhaustion() {
        let index = Arc::new(FixedIndex::new(&["a", "b", "c"]));
        let source = source_over(index.clone(), 2);

        assert_eq!(source.pop().await, Some(ObjectId::from("a")));
        assert_eq!(source.pop().await, Some(ObjectId::from("b")));
        assert_eq!(source.pop().await, Some(ObjectId::from("c")));
        assert_eq!(source.pop().await, None);
        // Two windows cover the three ids; the offset/total comparison
        // spares a third query.
        assert_eq!(index.fetch_count(), 2);

        let snapshot = source.snapshot().await;
        assert_eq!(snapshot.total_matching, Some(3));
        assert_eq!(snapshot.pages_fetched, 2);
    }

    #[tokio::test]
    async fn exact_page_boundary_needs_no_extra_fetch() {
        let index = Arc::new(FixedIndex::new(&["a", "b"]));
        let source = source_over(index.clone(), 2);

        assert!(source.pop().await.is_some());
        assert!(source.pop().await.is_some());
        assert_eq!(source.pop().await, None);
        assert_eq!(index.fetch_count(), 1);
    }

    #[tokio::test]
    async fn empty_filter_terminates_immediately() {
        let index = Arc::new(FixedIndex::new(&[]));
        let source = source_over(index.clone(), 10);

        assert_eq!(source.pop().await, None);
        assert_eq!(source.pop().await, None);
        assert_eq!(index.fetch_count(), 1);
    }

    #[tokio::test]
    async fn stops_querying_after_an_empty_page_despite_larger_total() {
        let index = Arc::new(FixedIndex {
            ids: vec![ObjectId::from("a"), ObjectId::from("b")],
            reported_total: Some(50),
            fetches: AtomicUsize::new(0),
        });
        let source = source_over(index.clone(), 5);

        assert!(source.pop().await.is_some());
        assert!(source.pop().await.is_some());
        assert_eq!(source.pop().await, None);
        assert_eq!(source.pop().await, None);
        // One window returned ids, the next returned none; after that
        // no further remote calls are issued.
        assert_eq!(index.fetch_count(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_ends_the_run_quietly() {
        let source = IdSource::new(Arc::new(FailingIndex), TypeFilter::from("FileSet"), 10);
        assert_eq!(source.pop().await, None);
        assert_eq!(source.pop().await, None);
    }

    #[tokio::test]
    async fn concurrent_pops_yield_each_id_exactly_once() {
        let ids: Vec<String> = (0..500).map(|n| format!("id{n}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let index = Arc::new(FixedIndex::new(&id_refs));
        let source = Arc::new(source_over(index, 37));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let source = source.clone();
            tasks.spawn(async move {
                let mut seen = Vec::new();
                while let Some(id) = source.pop().await {
                    seen.push(id);
                }
                seen
            });
        }

        let mut all = Vec::new();
        while let Some(result) = tasks.join_next().await {
            all.extend(result.expect("worker task completes"));
        }

        assert_eq!(all.len(), 500);
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), 500);
    }
}
