use tokio::sync::broadcast;

use tiprun_core::{LogFormat, Settings};
use tiprun_sync::{GitOracle, GitSynchronizer};

use crate::controller::{Controller, ControllerOptions};
use crate::error::{io_err, DaemonError};
use crate::scheduler::Scheduler;
use crate::supervisor::ChildSupervisor;

/// Start the updater and block the current thread until it exits.
pub fn start_blocking(settings: Settings) -> Result<(), DaemonError> {
    init_tracing(settings.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(settings))
}

/// Run update cycles until SIGINT or SIGTERM, then stop the managed process.
pub async fn run(settings: Settings) -> Result<(), DaemonError> {
    tracing::info!(
        url = %settings.repo.url,
        branch = %settings.repo.branch,
        workspace = %settings.workspace.path().display(),
        command = %settings.command,
        interval_secs = settings.interval.as_secs(),
        restart_on_update = settings.restart_on_update,
        "tiprun starting"
    );

    let controller = Controller::new(
        settings.repo.clone(),
        settings.workspace.clone(),
        settings.command.clone(),
        ControllerOptions::from_settings(&settings),
        GitOracle::new(settings.git_timeout),
        GitSynchronizer::new(settings.git_timeout),
        ChildSupervisor,
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);
    let signals = Signals::install().map_err(|e| io_err("signal-handler", e))?;
    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let name = signals.recv().await;
            tracing::info!("received {name}, shutting down");
            let _ = shutdown.send(());
        })
    };

    let result = Scheduler::new(controller, settings.interval)
        .run(shutdown_rx)
        .await;
    signal_handle.abort();
    drop(shutdown_tx);

    result?;
    tracing::info!("tiprun stopped");
    Ok(())
}

/// Shutdown signals, registered before the first cycle so an early SIGTERM is
/// never handled by the default disposition.
struct Signals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    #[cfg(unix)]
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    async fn recv(self) -> &'static str {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("ctrl-c handler failed: {err}");
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// filter. Records from `log`-based crates are forwarded too.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = match format {
        LogFormat::Text => fmt().with_env_filter(filter).with_target(false).try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
    };
}
