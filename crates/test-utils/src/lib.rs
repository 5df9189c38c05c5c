pub mod builders;
pub mod fake_launcher;

use std::sync::Arc;
use std::sync::Once;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};

use scriptdock::config::AppSettings;
use scriptdock::exec::LauncherBackend;
use scriptdock::output::OutputBroker;
use scriptdock::registry::ProjectRegistry;
use scriptdock::session::{spawn_writer, SessionStore};
use scriptdock::supervisor::{RunState, StateChanged, Supervisor, SupervisorHandle};

use crate::fake_launcher::FakeLauncher;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Consume state events until one for `id` matches `pred`, with a timeout.
pub async fn wait_for_state<F>(
    rx: &mut broadcast::Receiver<StateChanged>,
    id: &str,
    pred: F,
) -> StateChanged
where
    F: Fn(&RunState) -> bool,
{
    with_timeout(async {
        loop {
            let event = rx.recv().await.expect("state channel closed");
            if event.project_id == id && pred(&event.new) {
                return event;
            }
        }
    })
    .await
}

/// A supervisor wired to a [`FakeLauncher`], ready for commands.
pub struct SupervisorFixture {
    pub handle: SupervisorHandle,
    pub launcher: Arc<FakeLauncher>,
    pub broker: Arc<OutputBroker>,
    pub supervisor_task: JoinHandle<()>,
    /// Holds `session.json`; dropped with the fixture.
    pub state_dir: tempfile::TempDir,
}

impl SupervisorFixture {
    /// The session file written by this fixture's supervisor.
    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(self.state_dir.path())
    }
}

/// Spawn a supervisor over a fake launcher. Must be called from within a
/// Tokio runtime.
pub fn spawn_supervisor(registry: Arc<ProjectRegistry>, settings: AppSettings) -> SupervisorFixture {
    let state_dir = tempfile::tempdir().expect("create state dir");
    let broker = Arc::new(OutputBroker::new(settings.output_buffer_lines));
    let (tx, rx) = mpsc::channel(64);
    let (state_tx, _) = broadcast::channel(256);
    let launcher = Arc::new(FakeLauncher::new(tx.clone()));
    let (session_handle, _writer) = spawn_writer(SessionStore::new(state_dir.path()));

    let supervisor = Supervisor::new(
        Arc::clone(&registry),
        settings,
        Arc::clone(&launcher) as Arc<dyn LauncherBackend>,
        session_handle,
        state_tx.clone(),
        rx,
    );
    let supervisor_task = tokio::spawn(supervisor.run());
    let handle = SupervisorHandle::new(tx, state_tx, Arc::clone(&broker), registry);

    SupervisorFixture {
        handle,
        launcher,
        broker,
        supervisor_task,
        state_dir,
    }
}
