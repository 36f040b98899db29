//! Background request execution.
//!
//! A single worker task drains a FIFO queue of requests, so requests run in
//! the order their starts were issued. Each start hands back a
//! [`PendingRequest`]; awaiting it yields the response. The worker is the
//! only writer of the cookie jar while requests are in flight: it stamps the
//! jar onto each request just before sending and folds the response cookies
//! back in afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::cookies::CookieJar;
use crate::error::{SubmitError, SubmitResult, TransportError};
use crate::transport::Transport;
use crate::types::{HttpRequest, Method, Response};

type Reply = Result<Response, TransportError>;

struct Job {
    request: HttpRequest,
    reply: oneshot::Sender<Reply>,
}

/// Handle to a request that has been started but not yet completed.
///
/// Must be passed to a matching `*_complete` call. Dropping it instead
/// leaves the request running unobserved and is logged as abandoned.
#[must_use = "a started request must be completed"]
pub struct PendingRequest {
    method: Method,
    url: String,
    started_at: Instant,
    reply: Option<oneshot::Receiver<Reply>>,
    in_flight: Arc<AtomicUsize>,
}

impl PendingRequest {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Wait for the worker to finish this request.
    pub async fn wait(mut self) -> SubmitResult<Response> {
        let url = self.url.clone();
        let Some(reply) = self.reply.take() else {
            return Err(TransportError::WorkerStopped { url }.into());
        };
        match reply.await {
            Ok(result) => {
                tracing::trace!(
                    "{} {} finished in {:?}",
                    self.method,
                    url,
                    self.started_at.elapsed()
                );
                result.map_err(SubmitError::from)
            }
            Err(_) => Err(TransportError::WorkerStopped { url }.into()),
        }
    }

    /// Like [`PendingRequest::wait`] but gives up after `limit`. The request
    /// keeps running on the worker; only the wait is abandoned.
    pub async fn wait_within(self, limit: Duration) -> SubmitResult<Response> {
        let url = self.url.clone();
        let started_at = self.started_at;
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(result) => result,
            Err(_) => {
                let waited = started_at.elapsed();
                tracing::warn!("abandoning {} after {:?}; it may still complete", url, waited);
                Err(TransportError::Abandoned {
                    url,
                    waited_ms: waited.as_millis(),
                }
                .into())
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.reply.is_some() {
            tracing::warn!(
                "{} {} dropped without being completed; request abandoned",
                self.method,
                self.url
            );
        }
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// FIFO request executor bound to one session.
pub struct TaskRunner {
    jobs: mpsc::UnboundedSender<Job>,
    in_flight: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

impl TaskRunner {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(transport: Arc<dyn Transport>, jar: Arc<Mutex<CookieJar>>) -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(queue, transport, jar));
        Self {
            jobs,
            in_flight: Arc::new(AtomicUsize::new(0)),
            worker,
        }
    }

    /// Queue `request` and return its handle without waiting.
    pub fn start(&self, request: HttpRequest) -> PendingRequest {
        let (reply, receiver) = oneshot::channel();
        let method = request.method;
        let url = request.url.clone();
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        // A send failure drops the reply sender, so the handle resolves to
        // WorkerStopped when awaited.
        if self.jobs.send(Job { request, reply }).is_err() {
            tracing::error!("request worker is gone; {} {} will fail", method, url);
        }

        PendingRequest {
            method,
            url,
            started_at: Instant::now(),
            reply: Some(receiver),
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Requests started whose handles have not been completed or dropped.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Close the queue and wait for the worker to drain it.
    pub async fn shutdown(self) {
        let outstanding = self.in_flight();
        if outstanding > 0 {
            tracing::warn!("shutting down with {} uncompleted request(s)", outstanding);
        }
        drop(self.jobs);
        if let Err(e) = self.worker.await {
            tracing::error!("request worker panicked: {e}");
        }
    }
}

async fn run_worker(
    mut queue: mpsc::UnboundedReceiver<Job>,
    transport: Arc<dyn Transport>,
    jar: Arc<Mutex<CookieJar>>,
) {
    while let Some(Job { mut request, reply }) = queue.recv().await {
        request.cookies = lock(&jar).snapshot();
        let method = request.method;
        let url = request.url.clone();

        let result = transport.send(request).await;
        match &result {
            Ok(response) => lock(&jar).merge(&response.cookies),
            Err(e) => tracing::debug!("{} {} failed: {}", method, url, e),
        }

        if reply.send(result).is_err() {
            tracing::debug!("{} {} completed after its handle was dropped", method, url);
        }
    }
    tracing::trace!("request worker stopped");
}

pub(crate) fn lock(jar: &Mutex<CookieJar>) -> std::sync::MutexGuard<'_, CookieJar> {
    jar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
