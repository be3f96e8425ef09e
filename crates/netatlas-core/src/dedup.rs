//! Collapses concurrent identical requests into one underlying call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::http_client::HttpMethod;
use crate::QueryParams;

type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct PendingRequest<T, E> {
    generation: u64,
    future: SharedResult<T, E>,
}

type PendingMap<T, E> = Arc<Mutex<HashMap<String, PendingRequest<T, E>>>>;

/// At most one in-flight operation per key.
///
/// Callers arriving while a key is pending receive a clone of the same shared
/// future and observe the identical settled value. The entry is removed as
/// soon as the operation settles, so the next call for the key starts fresh.
pub struct RequestDeduplicator<T, E> {
    pending: PendingMap<T, E>,
    next_generation: AtomicU64,
}

impl<T, E> Default for RequestDeduplicator<T, E> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }
}

impl<T, E> RequestDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` unless a request for `key` is already in flight, in
    /// which case its result is awaited instead.
    ///
    /// `operation` only builds the future; it is called under the pending-map
    /// lock and must not call back into this deduplicator synchronously.
    pub async fn deduplicate<F, Fut>(&self, key: impl Into<String>, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = key.into();
        let shared = {
            let mut pending = self
                .pending
                .lock()
                .expect("dedup pending map should not be poisoned");

            if let Some(existing) = pending.get(&key) {
                tracing::debug!(key = %key, "joining in-flight request");
                existing.future.clone()
            } else {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let future = self.settle_and_remove(key.clone(), generation, operation());
                pending.insert(
                    key,
                    PendingRequest {
                        generation,
                        future: future.clone(),
                    },
                );
                future
            }
        };

        shared.await
    }

    fn settle_and_remove<Fut>(&self, key: String, generation: u64, future: Fut) -> SharedResult<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let pending = Arc::clone(&self.pending);
        async move {
            let result = future.await;
            let mut pending = pending
                .lock()
                .expect("dedup pending map should not be poisoned");
            if pending
                .get(&key)
                .is_some_and(|entry| entry.generation == generation)
            {
                pending.remove(&key);
            }
            result
        }
        .boxed()
        .shared()
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .expect("dedup pending map should not be poisoned")
            .len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .expect("dedup pending map should not be poisoned")
            .contains_key(key)
    }
}

/// Deduplication key: method, normalized endpoint and sorted parameters.
///
/// Query strings embedded in `endpoint` are merged into `params`, so
/// parameter order never changes the key.
pub fn request_key(method: HttpMethod, endpoint: &str, params: &QueryParams) -> String {
    let (base, embedded) = endpoint
        .split_once('?')
        .map_or((endpoint, None), |(base, query)| (base, Some(query)));

    let mut merged = params.clone();
    if let Some(query) = embedded {
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = urlencoding::decode(name).map_or_else(|_| name.to_owned(), |v| v.into_owned());
            let value =
                urlencoding::decode(value).map_or_else(|_| value.to_owned(), |v| v.into_owned());
            if merged.get(&name).is_none() {
                merged.insert(name, value);
            }
        }
    }

    let normalized = normalize_endpoint(base);
    if merged.is_empty() {
        format!("{method} {normalized}")
    } else {
        format!("{method} {normalized}?{}", merged.serialize())
    }
}

/// Lowercase scheme and host, drop a trailing `/`.
fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    let normalized = match endpoint.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = rest
                .find('/')
                .map_or((rest, ""), |index| rest.split_at(index));
            format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            )
        }
        None => endpoint.to_owned(),
    };

    match normalized.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() && !stripped.ends_with(':') => stripped.to_owned(),
        _ => normalized,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_invocation() {
        let dedup = Arc::new(RequestDeduplicator::<u32, String>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let dedup = Arc::clone(&dedup);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                dedup
                    .deduplicate("GET /cables", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.expect("task joins"), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test]
    async fn failures_are_shared_and_cleared() {
        let dedup = RequestDeduplicator::<u32, String>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Err::<u32, _>(String::from("boom"))
            }
        };

        let (first, second) = tokio::join!(
            dedup.deduplicate("k", make(Arc::clone(&calls))),
            dedup.deduplicate("k", make(Arc::clone(&calls)))
        );
        assert_eq!(first, Err(String::from("boom")));
        assert_eq!(second, Err(String::from("boom")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dedup.is_pending("k"));

        let third = dedup.deduplicate("k", make(Arc::clone(&calls))).await;
        assert_eq!(third, Err(String::from("boom")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn request_key_ignores_parameter_order_and_host_case() {
        let params = QueryParams::new().with("b", "2").with("a", "1");
        let left = request_key(HttpMethod::Get, "HTTPS://WWW.PeeringDB.com/api/ix/", &params);
        let right = request_key(
            HttpMethod::Get,
            "https://www.peeringdb.com/api/ix?a=1",
            &QueryParams::new().with("b", "2"),
        );

        assert_eq!(left, right);
        assert_eq!(left, "GET https://www.peeringdb.com/api/ix?a=1&b=2");
    }

    #[test]
    fn request_key_distinguishes_methods() {
        let params = QueryParams::new();
        assert_ne!(
            request_key(HttpMethod::Get, "/ix", &params),
            request_key(HttpMethod::Post, "/ix", &params)
        );
    }
}
