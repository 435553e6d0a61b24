//! Rate-limited document submitter.

use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::payload::SubmissionRequest;
use super::response::{handle_response, SubmissionStats, SubmitOutcome};
use super::transport::{HttpTransport, Transport};
use crate::config::DocketConfig;
use crate::error::Result;
use crate::ratelimit::{AdmissionGate, RateLimit};

/// Worker threads used when no configuration is given.
const DEFAULT_WORKER_THREADS: usize = 2;

/// Submits signed documents to the registration endpoint without exceeding
/// a request ceiling.
///
/// `submit` blocks while the current window is saturated and then until the
/// HTTP exchange has finished. It never fails: every problem is logged and
/// summarized in the returned [`SubmitOutcome`].
///
/// The gate's lock covers admission and bookkeeping only, not the network
/// round-trip. Admitted requests from different callers may be in flight
/// at the same time; a fully serialized client would hold one lock across
/// the whole exchange.
///
/// Requests run on a runtime owned by the submitter, so `submit` must be
/// called from a plain thread. Async code should go through
/// `tokio::task::spawn_blocking`. Dropping the submitter is safe anywhere,
/// including inside async code.
pub struct Submitter {
    /// Admission control; the stats share its lock
    gate: Arc<AdmissionGate<SubmissionStats>>,
    transport: Arc<dyn Transport>,
    handle: Handle,
    /// Taken on drop and shut down in the background
    runtime: Option<Runtime>,
}

impl Submitter {
    /// Create a submitter for the configured endpoint.
    ///
    /// Fails on a malformed endpoint, an invalid rate limit, or if the HTTP
    /// client or dispatch runtime cannot be built.
    pub fn new(config: &DocketConfig) -> Result<Self> {
        config.validate()?;
        let limit = config.rate_limit.to_rate_limit()?;
        let transport = HttpTransport::new(&config.endpoint, config.http.timeout())?;

        info!(
            endpoint = %transport.endpoint(),
            ceiling = limit.ceiling(),
            window = ?limit.window(),
            "Submitter configured"
        );

        Self::build(limit, Arc::new(transport), config.http.worker_threads)
    }

    /// Create a submitter around any transport.
    pub fn with_transport(limit: RateLimit, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::build(limit, transport, DEFAULT_WORKER_THREADS)
    }

    fn build(limit: RateLimit, transport: Arc<dyn Transport>, worker_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("docket-dispatch")
            .enable_all()
            .build()?;

        Ok(Self {
            gate: Arc::new(AdmissionGate::new(limit)),
            transport,
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Submit `document` with its signature.
    #[instrument(skip_all, fields(submission = %Uuid::new_v4()))]
    pub fn submit<D: Serialize + ?Sized>(&self, document: &D, sign: &str) -> SubmitOutcome {
        let body = match SubmissionRequest::new(document, sign).to_body() {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Document could not be serialized");
                return self.finish(SubmitOutcome::Unserializable);
            }
        };

        info!(body = %body, "Submitting document");

        let Some(admission) = self.gate.admit_with(|stats| stats.admitted += 1) else {
            warn!("Submitter closed while waiting for admission, request dropped");
            return self.finish(SubmitOutcome::Cancelled);
        };

        debug!(
            position = admission.position,
            waited = ?admission.waited,
            admitted_at = %admission.admitted_at,
            "Admission granted"
        );

        match futures::executor::block_on(self.dispatch(body)) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Request task did not complete");
                self.finish(SubmitOutcome::TransportFailed)
            }
        }
    }

    /// Spawn the request with response handling as its continuation.
    fn dispatch(&self, body: String) -> JoinHandle<SubmitOutcome> {
        let transport = Arc::clone(&self.transport);
        let gate = Arc::clone(&self.gate);

        self.handle.spawn(
            async move {
                let outcome = handle_response(transport.post(body).await);
                gate.with_shared_mut(|stats| stats.record(outcome));
                outcome
            }
            .in_current_span(),
        )
    }

    fn finish(&self, outcome: SubmitOutcome) -> SubmitOutcome {
        self.gate.with_shared_mut(|stats| stats.record(outcome));
        outcome
    }

    /// Stop admitting requests and release every blocked caller.
    ///
    /// Callers waiting for a slot return [`SubmitOutcome::Cancelled`]; requests
    /// already admitted run to completion.
    pub fn close(&self) {
        info!("Closing submitter");
        self.gate.close();
    }

    /// Snapshot of the running totals.
    pub fn stats(&self) -> SubmissionStats {
        self.gate.shared()
    }

    /// The ceiling this submitter enforces.
    pub fn rate_limit(&self) -> RateLimit {
        self.gate.limit()
    }

    /// Slots still free in the current window.
    pub fn remaining(&self) -> u32 {
        self.gate.remaining()
    }
}

impl Drop for Submitter {
    fn drop(&mut self) {
        // A blocking shutdown panics when dropped from async code
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransportResponse;
    use crate::error::DocketError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Transport that answers with a fixed status and remembers what it saw.
    struct RecordingTransport {
        status: u16,
        latency: Duration,
        sent: Mutex<Vec<(Instant, String)>>,
    }

    impl RecordingTransport {
        fn new(status: u16) -> Arc<Self> {
            Self::with_latency(status, Duration::ZERO)
        }

        fn with_latency(status: u16, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                status,
                latency,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn bodies(&self) -> Vec<String> {
            self.sent.lock().iter().map(|(_, body)| body.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn post(&self, body: String) -> Result<TransportResponse> {
            self.sent.lock().push((Instant::now(), body));
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            Ok(TransportResponse {
                status: self.status,
                body: r#"{"value":"registered"}"#.to_string(),
            })
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn post(&self, _body: String) -> Result<TransportResponse> {
            Err(transport_error())
        }
    }

    /// A genuine reqwest failure, built without touching the network.
    fn transport_error() -> DocketError {
        let err = reqwest::Client::new()
            .post("http://[::1")
            .build()
            .unwrap_err();
        DocketError::Transport(err)
    }

    fn limit(ms: u64, ceiling: u32) -> RateLimit {
        RateLimit::new(Duration::from_millis(ms), ceiling).unwrap()
    }

    #[test]
    fn test_submit_sends_signed_body() {
        let transport = RecordingTransport::new(200);
        let submitter = Submitter::with_transport(limit(1000, 5), transport.clone()).unwrap();

        let outcome = submitter.submit(&json!({"a": 1}), "sig");

        assert_eq!(outcome, SubmitOutcome::Accepted { status: 200 });
        assert_eq!(transport.bodies(), vec![r#"{"document":{"a":1},"sign":"sig"}"#]);

        let stats = submitter.stats();
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.accepted, 1);
    }

    #[test]
    fn test_error_status_is_reported_not_raised() {
        let transport = RecordingTransport::new(503);
        let submitter = Submitter::with_transport(limit(1000, 5), transport).unwrap();

        assert_eq!(
            submitter.submit(&json!({}), "sig"),
            SubmitOutcome::Rejected { status: 503 }
        );
        assert_eq!(submitter.stats().rejected, 1);
    }

    #[test]
    fn test_transport_failure_is_swallowed() {
        let submitter = Submitter::with_transport(limit(1000, 5), Arc::new(FailingTransport)).unwrap();

        assert_eq!(submitter.submit(&json!({}), "sig"), SubmitOutcome::TransportFailed);
        assert_eq!(submitter.stats().failed, 1);
        assert_eq!(submitter.stats().admitted, 1);
    }

    #[test]
    fn test_unserializable_document_consumes_no_slot() {
        let transport = RecordingTransport::new(200);
        let submitter = Submitter::with_transport(limit(1000, 1), transport.clone()).unwrap();

        let mut document = std::collections::HashMap::new();
        document.insert((1, 2), "tuple keys are not JSON");

        assert_eq!(submitter.submit(&document, "sig"), SubmitOutcome::Unserializable);
        assert!(transport.bodies().is_empty());
        assert_eq!(submitter.remaining(), 1);
    }

    #[test]
    fn test_ceiling_calls_do_not_block() {
        let transport = RecordingTransport::new(200);
        let submitter = Submitter::with_transport(limit(10_000, 3), transport.clone()).unwrap();

        let started = Instant::now();
        for n in 0..3 {
            assert!(submitter.submit(&json!({ "n": n }), "sig").is_accepted());
        }

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(submitter.remaining(), 0);
    }

    #[test]
    fn test_call_past_ceiling_waits_for_next_window() {
        let transport = RecordingTransport::new(200);
        let submitter = Submitter::with_transport(limit(400, 2), transport.clone()).unwrap();

        let started = Instant::now();
        submitter.submit(&json!({"n": 1}), "sig");
        submitter.submit(&json!({"n": 2}), "sig");
        let third = Instant::now();
        submitter.submit(&json!({"n": 3}), "sig");

        assert!(third.duration_since(started) < Duration::from_millis(300));
        assert!(started.elapsed() >= Duration::from_millis(390));
        assert_eq!(transport.bodies().len(), 3);
    }

    #[test]
    fn test_concurrent_overload_all_return_normally() {
        let ceiling = 3;
        let window = Duration::from_millis(200);
        let transport = RecordingTransport::with_latency(200, Duration::from_millis(10));
        let submitter = Submitter::with_transport(limit(200, ceiling), transport.clone()).unwrap();

        let started = Instant::now();
        let outcomes: Vec<SubmitOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = (0..ceiling * 3)
                .map(|n| {
                    let submitter = &submitter;
                    scope.spawn(move || submitter.submit(&json!({ "n": n }), "sig"))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(outcomes.iter().all(SubmitOutcome::is_accepted));
        assert_eq!(submitter.stats().admitted, (ceiling * 3) as u64);
        // Three full windows are needed, so at least two window lengths pass
        assert!(started.elapsed() >= window * 2 - Duration::from_millis(20));

        // Sends before the first reset fit within the first window
        let first_window_sends = transport
            .sent
            .lock()
            .iter()
            .filter(|(at, _)| at.duration_since(started) < window / 2)
            .count();
        assert!(first_window_sends <= ceiling as usize);
    }

    #[test]
    fn test_close_cancels_blocked_submitters() {
        let transport = RecordingTransport::new(200);
        let submitter = Submitter::with_transport(limit(60_000, 1), transport.clone()).unwrap();

        assert!(submitter.submit(&json!({}), "first").is_accepted());

        let outcome = thread::scope(|scope| {
            let blocked = scope.spawn(|| submitter.submit(&json!({}), "second"));
            thread::sleep(Duration::from_millis(100));
            submitter.close();
            blocked.join().unwrap()
        });

        assert_eq!(outcome, SubmitOutcome::Cancelled);
        assert_eq!(transport.bodies().len(), 1);
        assert_eq!(submitter.stats().cancelled, 1);

        // Closed submitters stay closed
        assert_eq!(submitter.submit(&json!({}), "third"), SubmitOutcome::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drop_inside_async_context() {
        let transport = RecordingTransport::new(200);
        let submitter = Submitter::with_transport(limit(1000, 5), transport.clone()).unwrap();

        let (submitter, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = submitter.submit(&json!({"a": 1}), "sig");
            (submitter, outcome)
        })
        .await
        .unwrap();

        assert_eq!(outcome, SubmitOutcome::Accepted { status: 200 });
        drop(submitter);
        assert_eq!(transport.bodies().len(), 1);
    }
}
