//! Result paging (spec §4.6, §9).
//!
//! `PagingState` is an opaque token round-tripped through `QueryParams`;
//! the driver never inspects its contents. Auto-paging composes pages into
//! a single async stream, fetching the next page only once the consumer
//! has drained the current one (backpressure by construction — no
//! read-ahead buffer).

use crate::error::Result;
use crate::protocol::messages::{QueryResult, Rows};
use std::pin::Pin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingState(pub Vec<u8>);

/// A function that fetches one page given an optional paging state from the
/// previous page; supplied by the caller (client façade) so this module
/// stays free of pool/routing concerns.
pub type FetchPage<'a> = Box<
    dyn FnMut(Option<PagingState>) -> Pin<Box<dyn std::future::Future<Output = Result<QueryResult>> + Send + 'a>>
        + Send
        + 'a,
>;

/// Drives `fetch` across pages until the server stops returning a paging
/// state, yielding each page's rows in order.
///
/// Spec §9 leaves open what happens if the caller supplies their own
/// initial `PagingState` and an intervening schema change invalidates it;
/// this driver's decision (recorded in the design ledger) is to surface
/// whatever `ProtocolError`/`Invalid` the coordinator reports rather than
/// silently restarting the scan, since restarting could silently skip or
/// duplicate rows depending on how the schema changed.
pub struct AutoPager<'a> {
    fetch: FetchPage<'a>,
    next_state: Option<PagingState>,
    done: bool,
}

impl<'a> AutoPager<'a> {
    pub fn new(fetch: FetchPage<'a>, initial_state: Option<PagingState>) -> AutoPager<'a> {
        AutoPager { fetch, next_state: initial_state, done: false }
    }

    pub async fn next_page(&mut self) -> Option<Result<Rows>> {
        if self.done {
            return None;
        }
        let state = self.next_state.take();
        match (self.fetch)(state).await {
            Ok(QueryResult::Rows(rows)) => {
                match &rows.metadata.paging_state {
                    Some(s) => self.next_state = Some(PagingState(s.clone())),
                    None => self.done = true,
                }
                Some(Ok(rows))
            }
            Ok(_) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::RowsMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn auto_pager_stops_once_paging_state_is_absent() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&call_count);

        let fetch: FetchPage = Box::new(move |state: Option<PagingState>| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let paging_state = if n == 0 { Some(vec![1]) } else { None };
                assert_eq!(state.is_some(), n == 1);
                Ok(QueryResult::Rows(Rows {
                    metadata: RowsMetadata { paging_state, ..Default::default() },
                    rows: vec![],
                }))
            })
        });

        let mut pager = AutoPager::new(fetch, None);
        assert!(pager.next_page().await.unwrap().is_ok());
        assert!(pager.next_page().await.unwrap().is_ok());
        assert!(pager.next_page().await.is_none());
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }
}
