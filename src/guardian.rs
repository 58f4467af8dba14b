//! Last line of defence for failures that escape request scope.
//!
//! Panics, failed background tasks and termination signals all end the
//! process. If a listener is serving, it is drained first (bounded by
//! `shutdown_timeout`); otherwise the process exits at once. Exit code is
//! always [`FATAL_EXIT_CODE`].

use std::fmt;
use std::future::Future;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::metrics::FATAL_TRIGGERS_TOTAL;

pub const FATAL_EXIT_CODE: i32 = 1;

/// Process-wide latch making sure hooks are registered once
static INSTALLED: InstallLatch = InstallLatch::new();

pub type ExitFn = Arc<dyn Fn(i32) + Send + Sync>;

#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("process guardian is already installed")]
    AlreadyInstalled,

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalTrigger {
    Panic(String),
    UnhandledRejection(String),
    Signal(ShutdownSignal),
}

impl FatalTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Panic(_) => "panic",
            Self::UnhandledRejection(_) => "unhandled_rejection",
            Self::Signal(ShutdownSignal::Interrupt) => "sigint",
            Self::Signal(ShutdownSignal::Terminate) => "sigterm",
        }
    }
}

impl fmt::Display for FatalTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panic(detail) => write!(f, "panic: {}", detail),
            Self::UnhandledRejection(detail) => write!(f, "unhandled rejection: {}", detail),
            Self::Signal(ShutdownSignal::Interrupt) => write!(f, "received Ctrl+C signal"),
            Self::Signal(ShutdownSignal::Terminate) => write!(f, "received SIGTERM signal"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuardianConfig {
    /// Upper bound on draining in-flight requests before exiting anyway
    pub shutdown_timeout: Duration,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// One-shot flag; `claim` succeeds for exactly one caller
pub struct InstallLatch(AtomicBool);

impl InstallLatch {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for InstallLatch {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    config: GuardianConfig,
    triggered: InstallLatch,
    exited: InstallLatch,
    listener_held: AtomicBool,
    trigger: watch::Sender<Option<FatalTrigger>>,
    exit: ExitFn,
}

#[derive(Clone)]
pub struct ProcessGuardian {
    inner: Arc<Inner>,
}

impl fmt::Debug for ProcessGuardian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessGuardian")
            .field("config", &self.inner.config)
            .field("listener_held", &self.inner.listener_held.load(Ordering::Acquire))
            .field("trigger", &*self.inner.trigger.borrow())
            .finish()
    }
}

impl ProcessGuardian {
    /// Guardian that terminates the real process. Hooks are not registered;
    /// see [`ProcessGuardian::install`].
    pub fn new(config: GuardianConfig) -> Self {
        Self::with_exit(config, Arc::new(|code| std::process::exit(code)))
    }

    pub fn with_exit(config: GuardianConfig, exit: ExitFn) -> Self {
        let (trigger, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                config,
                triggered: InstallLatch::new(),
                exited: InstallLatch::new(),
                listener_held: AtomicBool::new(false),
                trigger,
                exit,
            }),
        }
    }

    /// Register the panic hook and signal listener. Must run inside a Tokio
    /// runtime, once per process.
    pub fn install(config: GuardianConfig) -> Result<Self, GuardianError> {
        if !INSTALLED.claim() {
            return Err(GuardianError::AlreadyInstalled);
        }

        let guardian = Self::new(config);
        guardian.spawn_signal_listener()?;
        guardian.install_panic_hook();

        info!(
            shutdown_timeout_secs = guardian.inner.config.shutdown_timeout.as_secs(),
            "Process guardian installed"
        );
        Ok(guardian)
    }

    fn install_panic_hook(&self) {
        let previous = panic::take_hook();
        let guardian = self.clone();
        panic::set_hook(Box::new(move |info| {
            previous(info);
            guardian.trigger(FatalTrigger::Panic(info.to_string()));
        }));
    }

    fn spawn_signal_listener(&self) -> Result<(), GuardianError> {
        #[cfg(unix)]
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        let guardian = self.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            let terminate = async move {
                terminate.recv().await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            let received = next_signal(signal::ctrl_c(), terminate).await;
            guardian.trigger(FatalTrigger::Signal(received));
        });

        Ok(())
    }

    /// Mark that a network listener is being served and must be drained on exit
    pub fn attach_listener(&self) {
        self.inner.listener_held.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.trigger.borrow().is_some()
    }

    /// Start the fatal path. Returns `false` if another trigger already won.
    pub fn trigger(&self, trigger: FatalTrigger) -> bool {
        if !self.inner.triggered.claim() {
            warn!(trigger = %trigger, "Shutdown already in progress, ignoring trigger");
            return false;
        }

        FATAL_TRIGGERS_TOTAL
            .with_label_values(&[trigger.label()])
            .inc();
        error!(trigger = %trigger, "Fatal failure escaped request scope");

        if self.inner.listener_held.load(Ordering::Acquire) {
            info!("Starting graceful shutdown...");
            self.inner.trigger.send_replace(Some(trigger));
            self.spawn_watchdog();
        } else {
            self.inner.trigger.send_replace(Some(trigger));
            error!("Server closed.");
            self.exit();
        }
        true
    }

    /// Report a failure from a background task nobody awaits
    pub fn report_unhandled(&self, error: impl fmt::Display) -> bool {
        self.trigger(FatalTrigger::UnhandledRejection(error.to_string()))
    }

    /// Spawn a task whose error is treated as an unhandled rejection
    pub fn spawn_guarded<F, E>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let guardian = self.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                guardian.report_unhandled(e);
            }
        })
    }

    /// Resolves once a trigger fires; hand this to the server's graceful shutdown
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.inner.trigger.subscribe();
        async move {
            // Sender lives as long as the guardian
            let _ = receiver.wait_for(|trigger| trigger.is_some()).await;
        }
    }

    /// Call after the server stopped serving: exits if stopping was our doing
    pub fn finish(&self) {
        if self.is_triggered() {
            info!("Server shutdown complete");
            self.exit();
        }
    }

    fn spawn_watchdog(&self) {
        let guardian = self.clone();
        let timeout = self.inner.config.shutdown_timeout;
        std::thread::spawn(move || {
            std::thread::sleep(timeout);
            if !guardian.inner.exited.is_claimed() {
                error!(
                    timeout_secs = timeout.as_secs(),
                    "In-flight requests did not drain in time, exiting"
                );
            }
            guardian.exit();
        });
    }

    fn exit(&self) {
        if self.inner.exited.claim() {
            (self.inner.exit)(FATAL_EXIT_CODE);
        }
    }
}

/// Wait for the first shutdown signal. A failed Ctrl+C registration leaves
/// SIGTERM in charge.
async fn next_signal<I, T>(interrupt: I, terminate: T) -> ShutdownSignal
where
    I: Future<Output = std::io::Result<()>>,
    T: Future<Output = ()>,
{
    let interrupt = async {
        if let Err(e) = interrupt.await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => ShutdownSignal::Interrupt,
        _ = terminate => ShutdownSignal::Terminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording_guardian(timeout: Duration) -> (ProcessGuardian, Arc<Mutex<Vec<i32>>>) {
        let exits = Arc::new(Mutex::new(Vec::new()));
        let recorder = exits.clone();
        let guardian = ProcessGuardian::with_exit(
            GuardianConfig {
                shutdown_timeout: timeout,
            },
            Arc::new(move |code| recorder.lock().unwrap().push(code)),
        );
        (guardian, exits)
    }

    #[test]
    fn test_install_latch_claims_once() {
        let latch = InstallLatch::new();
        assert!(latch.claim());
        assert!(!latch.claim());
        assert!(!latch.claim());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rejections_exit_once() {
        let (guardian, exits) = recording_guardian(Duration::from_secs(30));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let guardian = guardian.clone();
                tokio::spawn(async move { guardian.report_unhandled(format!("rejection {}", i)) })
            })
            .collect();
        let won: Vec<bool> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|result| result.unwrap())
            .collect();

        assert_eq!(won.iter().filter(|w| **w).count(), 1);
        assert_eq!(*exits.lock().unwrap(), vec![FATAL_EXIT_CODE]);
    }

    #[tokio::test]
    async fn test_listener_drains_before_exit() {
        let (guardian, exits) = recording_guardian(Duration::from_secs(30));
        guardian.attach_listener();

        let shutdown = guardian.shutdown_signal();
        assert!(guardian.trigger(FatalTrigger::Signal(ShutdownSignal::Terminate)));
        tokio::time::timeout(Duration::from_secs(1), shutdown)
            .await
            .expect("shutdown signal should resolve");

        assert!(exits.lock().unwrap().is_empty());
        guardian.finish();
        assert_eq!(*exits.lock().unwrap(), vec![FATAL_EXIT_CODE]);

        assert!(!guardian.trigger(FatalTrigger::Panic("late".to_string())));
        guardian.finish();
        assert_eq!(exits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watchdog_bounds_the_drain() {
        let (guardian, exits) = recording_guardian(Duration::from_millis(20));
        guardian.attach_listener();
        guardian.trigger(FatalTrigger::UnhandledRejection("stuck".to_string()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*exits.lock().unwrap(), vec![FATAL_EXIT_CODE]);
    }

    #[tokio::test]
    async fn test_spawn_guarded_reports_errors() {
        let (guardian, exits) = recording_guardian(Duration::from_secs(30));

        guardian
            .spawn_guarded(async { Ok::<(), String>(()) })
            .await
            .unwrap();
        assert!(exits.lock().unwrap().is_empty());

        guardian
            .spawn_guarded(async { Err::<(), _>("queue consumer died") })
            .await
            .unwrap();
        assert_eq!(*exits.lock().unwrap(), vec![FATAL_EXIT_CODE]);
    }

    #[test]
    fn test_finish_without_trigger_does_not_exit() {
        let (guardian, exits) = recording_guardian(Duration::from_secs(30));
        guardian.finish();
        assert!(exits.lock().unwrap().is_empty());
        assert!(!guardian.is_triggered());
    }

    #[tokio::test]
    async fn test_failed_interrupt_still_observes_terminate() {
        let interrupt = async {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "no handler"))
        };
        let terminate = tokio::time::sleep(Duration::from_millis(20));

        let received = tokio::time::timeout(Duration::from_secs(1), next_signal(interrupt, terminate))
            .await
            .expect("terminate should still be observed");
        assert_eq!(received, ShutdownSignal::Terminate);
    }

    #[tokio::test]
    async fn test_interrupt_is_observed() {
        let received = next_signal(async { Ok(()) }, std::future::pending::<()>()).await;
        assert_eq!(received, ShutdownSignal::Interrupt);
    }

    #[test]
    fn test_trigger_labels() {
        assert_eq!(FatalTrigger::Panic(String::new()).label(), "panic");
        assert_eq!(
            FatalTrigger::Signal(ShutdownSignal::Terminate).to_string(),
            "received SIGTERM signal"
        );
    }
}
