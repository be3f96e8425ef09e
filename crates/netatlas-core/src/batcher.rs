//! Time-window request batching per upstream service.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::oneshot;

use crate::http_client::{HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse};

type Reply = oneshot::Sender<Result<HttpResponse, HttpError>>;
type Batch = Vec<(HttpRequest, Reply)>;

/// Accumulates requests per service for a fixed window, then dispatches them
/// grouped by `(method, path)`.
///
/// Each group is currently executed as individual calls through the
/// injected client; callers always receive their own result.
pub struct RequestBatcher {
    client: Arc<dyn HttpClient>,
    window: Duration,
    pending: Arc<Mutex<HashMap<String, Batch>>>,
}

impl RequestBatcher {
    pub const DEFAULT_WINDOW: Duration = Duration::from_millis(100);

    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self::with_window(client, Self::DEFAULT_WINDOW)
    }

    pub fn with_window(client: Arc<dyn HttpClient>, window: Duration) -> Self {
        Self {
            client,
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Queue `request` for `service_id` and wait for its response.
    pub async fn add(
        &self,
        service_id: &str,
        request: HttpRequest,
    ) -> Result<HttpResponse, HttpError> {
        let (reply, receiver) = oneshot::channel();

        let opens_window = {
            let mut pending = self
                .pending
                .lock()
                .expect("batcher pending map should not be poisoned");
            let batch = pending.entry(service_id.to_owned()).or_default();
            batch.push((request, reply));
            batch.len() == 1
        };

        if opens_window {
            let pending = Arc::clone(&self.pending);
            let client = Arc::clone(&self.client);
            let service = service_id.to_owned();
            let window = self.window;
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                let batch = pending
                    .lock()
                    .expect("batcher pending map should not be poisoned")
                    .remove(&service)
                    .unwrap_or_default();
                dispatch(client, &service, batch).await;
            });
        }

        receiver.await.map_err(|_| {
            HttpError::new(
                HttpErrorKind::Other,
                format!("batch for service '{service_id}' was dropped before completion"),
            )
        })?
    }

    /// Requests queued for `service_id` in the currently open window.
    pub fn pending(&self, service_id: &str) -> usize {
        self.pending
            .lock()
            .expect("batcher pending map should not be poisoned")
            .get(service_id)
            .map_or(0, Vec::len)
    }
}

async fn dispatch(client: Arc<dyn HttpClient>, service: &str, batch: Batch) {
    let mut groups: BTreeMap<(HttpMethod, String), Batch> = BTreeMap::new();
    for (request, reply) in batch {
        let group = (request.method, request.path().to_owned());
        groups.entry(group).or_default().push((request, reply));
    }

    tracing::debug!(service, groups = groups.len(), "dispatching request batch");

    for ((method, path), requests) in groups {
        tracing::trace!(service, %method, path = %path, size = requests.len(), "executing batch group");
        let calls = requests.into_iter().map(|(request, reply)| {
            let client = Arc::clone(&client);
            async move {
                let result = client.execute(request).await;
                // The caller may have gone away; nothing to report then.
                let _ = reply.send(result);
            }
        });
        join_all(calls).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::http_client::HttpFuture;

    #[derive(Default)]
    struct EchoClient {
        calls: AtomicUsize,
    }

    impl HttpClient for EchoClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if request.url.ends_with("/fail") {
                    return Err(HttpError::connect("refused"));
                }
                Ok(HttpResponse::ok_json(request.url))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn callers_receive_their_own_results() {
        let client = Arc::new(EchoClient::default());
        let batcher = RequestBatcher::new(client.clone());

        let (first, second, third) = tokio::join!(
            batcher.add("peeringdb", HttpRequest::get("https://api.test/ix?id=1")),
            batcher.add("peeringdb", HttpRequest::get("https://api.test/ix?id=2")),
            batcher.add("peeringdb", HttpRequest::get("https://api.test/fail")),
        );

        assert_eq!(first.expect("first").body, "https://api.test/ix?id=1");
        assert_eq!(second.expect("second").body, "https://api.test/ix?id=2");
        assert_eq!(
            third.expect_err("third fails").kind(),
            HttpErrorKind::Connect
        );
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(batcher.pending("peeringdb"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_wait_for_the_window() {
        let client = Arc::new(EchoClient::default());
        let batcher = Arc::new(RequestBatcher::with_window(
            client.clone(),
            Duration::from_millis(50),
        ));

        let task = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move { batcher.add("radar", HttpRequest::get("https://r.test/a")).await })
        };

        tokio::task::yield_now().await;
        assert_eq!(batcher.pending("radar"), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);

        let response = task.await.expect("join").expect("response");
        assert_eq!(response.status, 200);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_path_groups_ignore_query() {
        let a = HttpRequest::get("https://api.test/ix?id=1");
        let b = HttpRequest::get("https://api.test/ix?id=2");
        assert_eq!(a.path(), b.path());
    }
}
