#![forbid(unsafe_code)]

//! The dedicated processor thread.
//!
//! One [`ProcessorWorker`] owns one background thread that holds a
//! [`DiffProcessor`] per terminal plus the shared transform registry.
//! Requests are handled strictly FIFO — no reordering, no concurrent
//! processing of two messages for the same terminal — and responses come
//! back on a channel in matching order.
//!
//! The request queue is bounded. The original design left inbound queuing
//! unbounded under sustained overload; here a flooding producer sees
//! [`WorkerError::QueueFull`] from [`ProcessorWorker::try_send`] instead of
//! unbounded memory growth. Updates are diffs, so no coalescing is done —
//! dropping an intermediate update would corrupt screen reconstruction.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use termloom_core::processor::{DiffProcessor, UpdateMessage};
use termloom_core::transform::{RuleSpec, TransformFn, TransformRegistry};

/// Bound on the inbound request queue.
pub const REQUEST_QUEUE_CAPACITY: usize = 256;

/// Bound on the outbound response queue.
pub const RESPONSE_QUEUE_CAPACITY: usize = 256;

/// Default scrollback capacity for terminals the worker has not been
/// configured for explicitly.
pub const DEFAULT_SCROLLBACK_CAPACITY: usize = 500;

/// Requests accepted by the worker, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Process one screen update.
    Process(UpdateMessage),
    /// Replace the pattern rule set (rules cross as source text).
    SetRules(Vec<RuleSpec>),
    /// Re-bound one terminal's scrollback ring immediately.
    SetScrollbackCapacity { term: String, capacity: usize },
    /// Drop all state for a closed terminal.
    CloseTerminal { term: String },
    /// Stop the worker after draining nothing further.
    Shutdown,
}

/// Responses emitted by the worker, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WorkerResponse {
    /// A processed update for the rendering collaborator.
    Processed(termloom_core::ProcessedUpdate),
    /// A malformed update was dropped; the session continues.
    Rejected { term: String, reason: String },
    /// Result of a `SetRules` request: usable rule count plus one
    /// diagnostic per rule that failed to materialize.
    RulesLoaded {
        active: usize,
        diagnostics: Vec<String>,
    },
}

/// Errors from interacting with the worker from the control side.
#[derive(Debug)]
pub enum WorkerError {
    /// The worker thread could not be spawned.
    Spawn(io::Error),
    /// The bounded request queue is full (back-pressure).
    QueueFull,
    /// The worker thread has shut down.
    Disconnected,
}

impl core::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn worker thread: {e}"),
            Self::QueueFull => write!(f, "worker request queue is full"),
            Self::Disconnected => write!(f, "worker has shut down"),
        }
    }
}

impl std::error::Error for WorkerError {}

/// Worker configuration: numeric settings plus in-process function rules.
///
/// Function rules cannot cross the serialized boundary (there is no source
/// text to re-evaluate), so they are installed at spawn time and survive
/// `SetRules` reloads; pattern rules arrive as [`RuleSpec`] source text.
#[derive(Default)]
pub struct WorkerConfig {
    scrollback_capacity: Option<usize>,
    function_rules: Vec<(String, TransformFn)>,
}

impl WorkerConfig {
    /// Start from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scrollback capacity for newly seen terminals.
    #[must_use]
    pub fn with_scrollback_capacity(mut self, capacity: usize) -> Self {
        self.scrollback_capacity = Some(capacity);
        self
    }

    /// Install an in-process function rule, applied in registration order
    /// ahead of any pattern rules loaded later.
    #[must_use]
    pub fn with_function_rule(mut self, name: impl Into<String>, transform: TransformFn) -> Self {
        self.function_rules.push((name.into(), transform));
        self
    }
}

/// Handle to the dedicated processor thread.
pub struct ProcessorWorker {
    sender: mpsc::SyncSender<WorkerRequest>,
    responses: mpsc::Receiver<WorkerResponse>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessorWorker {
    /// Spawn the worker thread with the given configuration.
    pub fn spawn(config: WorkerConfig) -> Result<Self, WorkerError> {
        let (req_tx, req_rx) = mpsc::sync_channel::<WorkerRequest>(REQUEST_QUEUE_CAPACITY);
        let (resp_tx, resp_rx) = mpsc::sync_channel::<WorkerResponse>(RESPONSE_QUEUE_CAPACITY);

        let handle = thread::Builder::new()
            .name("termloom-worker".into())
            .spawn(move || worker_loop(config, req_rx, resp_tx))
            .map_err(WorkerError::Spawn)?;

        Ok(Self {
            sender: req_tx,
            responses: resp_rx,
            handle: Some(handle),
        })
    }

    /// Queue a request, blocking while the queue is full.
    pub fn send(&self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.sender
            .send(request)
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Queue a request without blocking.
    pub fn try_send(&self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.sender.try_send(request).map_err(|e| match e {
            mpsc::TrySendError::Full(_) => WorkerError::QueueFull,
            mpsc::TrySendError::Disconnected(_) => WorkerError::Disconnected,
        })
    }

    /// Wait for the next response.
    pub fn recv_response(&self) -> Result<WorkerResponse, WorkerError> {
        self.responses.recv().map_err(|_| WorkerError::Disconnected)
    }

    /// Poll for a response without blocking.
    pub fn try_recv_response(&self) -> Option<WorkerResponse> {
        self.responses.try_recv().ok()
    }

    /// Shut the worker down and join its thread. Idempotent via `Drop`.
    pub fn shutdown(mut self) {
        let _ = self.sender.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProcessorWorker {
    fn drop(&mut self) {
        let _ = self.sender.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    config: WorkerConfig,
    rx: mpsc::Receiver<WorkerRequest>,
    tx: mpsc::SyncSender<WorkerResponse>,
) {
    let default_capacity = config
        .scrollback_capacity
        .unwrap_or(DEFAULT_SCROLLBACK_CAPACITY);
    let function_rules = config.function_rules;

    let mut registry = TransformRegistry::new();
    for (name, transform) in &function_rules {
        registry.register_function(name.clone(), transform.clone());
    }

    let mut processors: HashMap<String, DiffProcessor> = HashMap::new();
    info!(scrollback_capacity = default_capacity, "processor worker started");

    while let Ok(request) = rx.recv() {
        match request {
            WorkerRequest::Process(msg) => {
                if msg.term.is_empty() {
                    warn!("update dropped: missing terminal id");
                    // Response channel may be gone; the session must not
                    // panic because a consumer disappeared.
                    let _ = tx.send(WorkerResponse::Rejected {
                        term: String::new(),
                        reason: "missing terminal id".to_string(),
                    });
                    continue;
                }
                let processor = processors.entry(msg.term.clone()).or_insert_with(|| {
                    debug!(term = %msg.term, "new terminal state");
                    DiffProcessor::new(msg.term.clone(), default_capacity)
                });
                match processor.process(&registry, &msg) {
                    Ok(update) => {
                        let _ = tx.send(WorkerResponse::Processed(update));
                    }
                    Err(e) => {
                        warn!(term = %msg.term, error = %e, "update dropped");
                        let _ = tx.send(WorkerResponse::Rejected {
                            term: msg.term,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            WorkerRequest::SetRules(specs) => {
                let mut next = TransformRegistry::new();
                for (name, transform) in &function_rules {
                    next.register_function(name.clone(), transform.clone());
                }
                for spec in specs {
                    next.register(spec);
                }
                // Compile everything now so the load result reports failures
                // up front; per-batch diagnostics still repeat them.
                let (pipeline, diagnostics) = next.pipeline();
                info!(
                    active = pipeline.len(),
                    failed = diagnostics.len(),
                    "transform rules loaded"
                );
                let active = pipeline.len();
                registry = next;
                let _ = tx.send(WorkerResponse::RulesLoaded { active, diagnostics });
            }
            WorkerRequest::SetScrollbackCapacity { term, capacity } => {
                debug!(term = %term, capacity, "scrollback capacity changed");
                processors
                    .entry(term.clone())
                    .or_insert_with(|| DiffProcessor::new(term, capacity))
                    .set_scrollback_capacity(capacity);
            }
            WorkerRequest::CloseTerminal { term } => {
                debug!(term = %term, "terminal closed");
                processors.remove(&term);
            }
            WorkerRequest::Shutdown => break,
        }
    }
    info!("processor worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use termloom_core::ScreenLine;

    fn update(term: &str, rows: &[&str]) -> UpdateMessage {
        UpdateMessage {
            term: term.to_string(),
            screen: rows.iter().map(|r| ScreenLine::from(*r)).collect(),
            scrollback_delta: Vec::new(),
            want_backspace_hint: false,
            rate_limited: false,
        }
    }

    fn spec(name: &str, pattern: &str, replacement: &str) -> RuleSpec {
        RuleSpec {
            name: name.to_string(),
            pattern: pattern.to_string(),
            flags: String::new(),
            replacement: replacement.to_string(),
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let worker = ProcessorWorker::spawn(WorkerConfig::new()).unwrap();
        worker.shutdown();
    }

    #[test]
    fn drop_shuts_down_without_hanging() {
        let worker = ProcessorWorker::spawn(WorkerConfig::new()).unwrap();
        drop(worker);
    }

    #[test]
    fn processes_update_and_responds() {
        let worker = ProcessorWorker::spawn(WorkerConfig::new()).unwrap();
        worker
            .send(WorkerRequest::Process(update("t1", &["hello   "])))
            .unwrap();
        let response = worker.recv_response().unwrap();
        match response {
            WorkerResponse::Processed(out) => {
                assert_eq!(out.term, "t1");
                assert_eq!(out.screen, vec!["hello".to_string()]);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        worker.shutdown();
    }

    #[test]
    fn responses_preserve_request_order() {
        let worker = ProcessorWorker::spawn(WorkerConfig::new()).unwrap();
        for i in 0..5 {
            let row = format!("line-{i}");
            worker
                .send(WorkerRequest::Process(update("t1", &[row.as_str()])))
                .unwrap();
        }
        for i in 0..5 {
            match worker.recv_response().unwrap() {
                WorkerResponse::Processed(out) => {
                    assert_eq!(out.screen, vec![format!("line-{i}")]);
                }
                other => panic!("unexpected response: {other:?}"),
            }
        }
        worker.shutdown();
    }

    #[test]
    fn rules_load_and_apply() {
        let worker = ProcessorWorker::spawn(WorkerConfig::new()).unwrap();
        worker
            .send(WorkerRequest::SetRules(vec![spec("up", "cat", "CAT")]))
            .unwrap();
        match worker.recv_response().unwrap() {
            WorkerResponse::RulesLoaded {
                active,
                diagnostics,
            } => {
                assert_eq!(active, 1);
                assert!(diagnostics.is_empty());
            }
            other => panic!("unexpected response: {other:?}"),
        }
        worker
            .send(WorkerRequest::Process(update("t1", &["a cat sat"])))
            .unwrap();
        match worker.recv_response().unwrap() {
            WorkerResponse::Processed(out) => {
                assert_eq!(out.screen, vec!["a CAT sat".to_string()]);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        worker.shutdown();
    }

    #[test]
    fn malformed_rule_reported_but_batch_survives() {
        let worker = ProcessorWorker::spawn(WorkerConfig::new()).unwrap();
        worker
            .send(WorkerRequest::SetRules(vec![
                spec("broken", "(((", "x"),
                spec("ok", "a", "A"),
            ]))
            .unwrap();
        match worker.recv_response().unwrap() {
            WorkerResponse::RulesLoaded {
                active,
                diagnostics,
            } => {
                assert_eq!(active, 1);
                assert_eq!(diagnostics.len(), 1);
                assert!(diagnostics[0].contains("broken"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
        worker
            .send(WorkerRequest::Process(update("t1", &["abc"])))
            .unwrap();
        match worker.recv_response().unwrap() {
            WorkerResponse::Processed(out) => {
                assert_eq!(out.screen, vec!["Abc".to_string()]);
                assert_eq!(out.diagnostics.len(), 1);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        worker.shutdown();
    }

    #[test]
    fn function_rules_survive_rule_reload() {
        let config = WorkerConfig::new()
            .with_function_rule("bang", Arc::new(|s: &str| format!("{s}!")));
        let worker = ProcessorWorker::spawn(config).unwrap();
        worker
            .send(WorkerRequest::SetRules(vec![spec("up", "x", "X")]))
            .unwrap();
        let _ = worker.recv_response().unwrap();
        worker
            .send(WorkerRequest::Process(update("t1", &["x"])))
            .unwrap();
        match worker.recv_response().unwrap() {
            WorkerResponse::Processed(out) => {
                assert_eq!(out.screen, vec!["X!".to_string()]);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        worker.shutdown();
    }

    #[test]
    fn missing_term_is_rejected_and_session_continues() {
        let worker = ProcessorWorker::spawn(WorkerConfig::new()).unwrap();
        worker
            .send(WorkerRequest::Process(update("", &["x"])))
            .unwrap();
        match worker.recv_response().unwrap() {
            WorkerResponse::Rejected { reason, .. } => {
                assert!(reason.contains("terminal id"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
        // The next valid message still processes.
        worker
            .send(WorkerRequest::Process(update("t1", &["ok"])))
            .unwrap();
        assert!(matches!(
            worker.recv_response().unwrap(),
            WorkerResponse::Processed(_)
        ));
        worker.shutdown();
    }

    #[test]
    fn per_terminal_state_is_isolated() {
        let worker =
            ProcessorWorker::spawn(WorkerConfig::new().with_scrollback_capacity(10)).unwrap();
        let mut a = update("a", &["x"]);
        a.scrollback_delta = vec!["from-a".to_string()];
        let b = update("b", &["y"]);
        worker.send(WorkerRequest::Process(a)).unwrap();
        worker.send(WorkerRequest::Process(b)).unwrap();
        let first = worker.recv_response().unwrap();
        let second = worker.recv_response().unwrap();
        match (first, second) {
            (WorkerResponse::Processed(a), WorkerResponse::Processed(b)) => {
                assert_eq!(a.scrollback, vec!["from-a".to_string()]);
                assert!(b.scrollback.is_empty());
            }
            other => panic!("unexpected responses: {other:?}"),
        }
        worker.shutdown();
    }

    #[test]
    fn close_terminal_drops_scrollback() {
        let worker = ProcessorWorker::spawn(WorkerConfig::new()).unwrap();
        let mut seeded = update("t1", &["x"]);
        seeded.scrollback_delta = vec!["old".to_string()];
        worker.send(WorkerRequest::Process(seeded)).unwrap();
        let _ = worker.recv_response().unwrap();

        worker
            .send(WorkerRequest::CloseTerminal {
                term: "t1".to_string(),
            })
            .unwrap();
        worker
            .send(WorkerRequest::Process(update("t1", &["fresh"])))
            .unwrap();
        match worker.recv_response().unwrap() {
            WorkerResponse::Processed(out) => assert!(out.scrollback.is_empty()),
            other => panic!("unexpected response: {other:?}"),
        }
        worker.shutdown();
    }

    #[test]
    fn scrollback_capacity_rebinds_at_runtime() {
        let worker =
            ProcessorWorker::spawn(WorkerConfig::new().with_scrollback_capacity(10)).unwrap();
        let mut seeded = update("t1", &["x"]);
        seeded.scrollback_delta = (0..6).map(|i| format!("l{i}")).collect();
        worker.send(WorkerRequest::Process(seeded)).unwrap();
        let _ = worker.recv_response().unwrap();

        worker
            .send(WorkerRequest::SetScrollbackCapacity {
                term: "t1".to_string(),
                capacity: 2,
            })
            .unwrap();
        worker
            .send(WorkerRequest::Process(update("t1", &["y"])))
            .unwrap();
        match worker.recv_response().unwrap() {
            WorkerResponse::Processed(out) => {
                assert_eq!(out.scrollback, vec!["l4".to_string(), "l5".to_string()]);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        worker.shutdown();
    }

    #[test]
    fn send_after_shutdown_errors() {
        let worker = ProcessorWorker::spawn(WorkerConfig::new()).unwrap();
        worker.send(WorkerRequest::Shutdown).unwrap();
        // Give the loop time to exit and drop its receiver.
        std::thread::sleep(std::time::Duration::from_millis(50));
        let result = worker.send(WorkerRequest::Process(update("t1", &["late"])));
        assert!(matches!(result, Err(WorkerError::Disconnected)));
    }

    #[test]
    fn worker_error_display() {
        assert_eq!(
            WorkerError::QueueFull.to_string(),
            "worker request queue is full"
        );
        assert_eq!(WorkerError::Disconnected.to_string(), "worker has shut down");
    }
}
