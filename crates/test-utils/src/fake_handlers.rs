use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use trellis::exec::{ActionTypeHandler, HandlerFuture, HandlerOutput, ResolvedAction};
use trellis::types::{ActionKind, ResultState};

/// Handler type name used by the fakes.
pub const FAKE_TYPE: &str = "fake";

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// A fake handler that:
/// - records which actions were executed, in order
/// - counts executions and status checks
/// - returns configurable static and executed outputs.
#[derive(Clone)]
pub struct CountingHandler {
    kind: ActionKind,
    static_outputs: Map<String, Value>,
    outputs: Map<String, Value>,
    status: ResultState,
    delay: Option<Duration>,
    executions: Arc<AtomicUsize>,
    status_checks: Arc<AtomicUsize>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl CountingHandler {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            static_outputs: Map::new(),
            outputs: Map::new(),
            status: ResultState::Ready,
            delay: None,
            executions: Arc::new(AtomicUsize::new(0)),
            status_checks: Arc::new(AtomicUsize::new(0)),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_static_outputs(mut self, outputs: Value) -> Self {
        self.static_outputs = object(outputs);
        self
    }

    pub fn with_outputs(mut self, outputs: Value) -> Self {
        self.outputs = object(outputs);
        self
    }

    pub fn with_status(mut self, status: ResultState) -> Self {
        self.status = status;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    /// Action keys in execution order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl ActionTypeHandler for CountingHandler {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn type_name(&self) -> &str {
        FAKE_TYPE
    }

    fn static_outputs(&self, _action: &ResolvedAction) -> anyhow::Result<Map<String, Value>> {
        Ok(self.static_outputs.clone())
    }

    fn get_status<'a>(&'a self, _action: &'a ResolvedAction) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.status_checks.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(HandlerOutput::new(self.status))
        })
    }

    fn execute<'a>(&'a self, action: &'a ResolvedAction) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.executions.fetch_add(1, Ordering::SeqCst);
            self.executed.lock().unwrap().push(action.key.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut outputs = self.outputs.clone();
            outputs.insert("spec".to_string(), action.spec.clone());
            Ok::<_, anyhow::Error>(HandlerOutput::ready(outputs))
        })
    }
}

/// Fails execution for the named actions and succeeds for all others.
#[derive(Clone)]
pub struct FailingHandler {
    kind: ActionKind,
    failing: Arc<HashSet<String>>,
    executions: Arc<AtomicUsize>,
}

impl FailingHandler {
    /// `failing` holds action names (not keys).
    pub fn new(kind: ActionKind, failing: &[&str]) -> Self {
        Self {
            kind,
            failing: Arc::new(failing.iter().map(|s| s.to_string()).collect()),
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl ActionTypeHandler for FailingHandler {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn type_name(&self) -> &str {
        FAKE_TYPE
    }

    fn execute<'a>(&'a self, action: &'a ResolvedAction) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(action.name()) {
                anyhow::bail!("{} failed on purpose", action.key);
            }
            Ok(HandlerOutput::ready(Map::new()))
        })
    }
}

/// Sleeps during execution and tracks how many executions overlap.
#[derive(Clone)]
pub struct SlowHandler {
    kind: ActionKind,
    delay: Duration,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    executions: Arc<AtomicUsize>,
}

impl SlowHandler {
    pub fn new(kind: ActionKind, delay: Duration) -> Self {
        Self {
            kind,
            delay,
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Highest number of executions observed running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl ActionTypeHandler for SlowHandler {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn type_name(&self) -> &str {
        FAKE_TYPE
    }

    fn execute<'a>(&'a self, _action: &'a ResolvedAction) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.executions.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(HandlerOutput::ready(Map::new()))
        })
    }
}
