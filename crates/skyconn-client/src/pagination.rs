//! Sync-state cursors for list calls that paginate implicitly.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use skyconn_core::Result;

type CursorKey = (String, String);

/// Cursor stacks keyed by `(method, url)`.
///
/// The first call for a key goes to the caller's URL and parameters. Once a
/// response has supplied a cursor, later calls for the same key go to the
/// newest cursor with no parameters. Keys never share state.
#[derive(Debug, Default)]
pub struct SyncStateCursors {
    stacks: Mutex<HashMap<CursorKey, Vec<String>>>,
}

impl SyncStateCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a paginated call.
    ///
    /// `fetch` receives the URL and parameters to use and returns its result
    /// plus the next cursor, if the response carried one.
    pub async fn call<R, F, Fut>(
        &self,
        method: &str,
        url: &str,
        params: Vec<(String, String)>,
        fetch: F,
    ) -> Result<R>
    where
        F: FnOnce(String, Vec<(String, String)>) -> Fut,
        Fut: Future<Output = Result<(R, Option<String>)>>,
    {
        let (target, params) = match self.latest(method, url) {
            Some(cursor) => {
                trace!(method, url, cursor = %cursor, "Following sync state");
                (cursor, Vec::new())
            }
            None => (url.to_string(), params),
        };

        let (result, cursor) = fetch(target, params).await?;
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            self.lock()
                .entry(key(method, url))
                .or_default()
                .push(cursor);
        }
        Ok(result)
    }

    /// Newest cursor recorded for a key.
    pub fn latest(&self, method: &str, url: &str) -> Option<String> {
        self.lock()
            .get(&key(method, url))
            .and_then(|stack| stack.last().cloned())
    }

    /// Number of cursors recorded for a key.
    pub fn depth(&self, method: &str, url: &str) -> usize {
        self.lock().get(&key(method, url)).map_or(0, Vec::len)
    }

    /// Forget one key, so its next call starts from the original URL.
    pub fn reset(&self, method: &str, url: &str) {
        self.lock().remove(&key(method, url));
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CursorKey, Vec<String>>> {
        self.stacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(method: &str, url: &str) -> CursorKey {
    (method.to_ascii_uppercase(), url.to_string())
}
