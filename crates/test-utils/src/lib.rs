//! Shared fixtures for trellis integration tests: project builders, fake
//! action type handlers and engine constructors.

pub mod builders;
pub mod fake_handlers;

use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};
use trellis::config::ProjectConfig;
use trellis::engine::{Engine, EngineOptions};
use trellis::exec::{ActionTypeHandler, HandlerRegistry};
use trellis::fs::mock::MockFileSystem;

pub use builders::{ActionBuilder, ProjectBuilder};
pub use fake_handlers::{CountingHandler, FAKE_TYPE, FailingHandler, SlowHandler};

/// Upper bound for any single engine call in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test-captured subscriber once per test binary.
///
/// Reads `TRELLIS_LOG`, then `RUST_LOG`, defaulting to `info`. Output only
/// shows for failing tests unless run with `--nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var("TRELLIS_LOG")
            .ok()
            .and_then(|s| EnvFilter::try_new(s).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .unwrap_or_else(|_| panic!("engine call did not finish within {TEST_TIMEOUT:?}"))
}

/// Registry holding only the given handlers.
pub fn registry(handlers: Vec<Arc<dyn ActionTypeHandler>>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    for handler in handlers {
        registry.register(handler);
    }
    registry
}

/// Engine over an empty in-memory file system.
pub fn engine(project: ProjectConfig, handlers: Vec<Arc<dyn ActionTypeHandler>>) -> Engine {
    engine_with_fs(project, handlers, Arc::new(MockFileSystem::new()))
}

pub fn engine_with_fs(
    project: ProjectConfig,
    handlers: Vec<Arc<dyn ActionTypeHandler>>,
    fs: Arc<MockFileSystem>,
) -> Engine {
    Engine::new(project, registry(handlers), fs, EngineOptions::default())
        .expect("engine should build")
}
