//! Compute worker supervised by the controller.
//!
//! Binds the worker address, signals readiness through the mechanism the
//! supervisor chose (`ALGOVISOR_READY` or `--ready`), then serves sensor
//! frames until SIGINT/SIGTERM/SIGQUIT.

use std::process::ExitCode;
use std::time::Duration;

use algovisor::fault::{FaultConfig, StartFault};
use algovisor::lifecycle::ReadyNotifier;
use algovisor::{Server, WorkerConfig, WorkerExit, WorkerService, init_logging};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "algo_worker")]
#[command(about = "Compute worker answering sensor frames with algorithm results", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "ALGOVISOR_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "ALGOVISOR_PORT", default_value_t = 45678)]
    port: u16,

    /// Simulated compute time per frame
    #[arg(long, default_value_t = 10)]
    compute_delay_ms: u64,

    /// Readiness mechanism: `pipe` or `event:<path>`
    #[arg(long, env = "ALGOVISOR_READY")]
    ready: Option<String>,

    /// Abort before signalling readiness
    #[arg(long)]
    crash_on_start: bool,

    /// Never signal readiness
    #[arg(long)]
    hang_on_start: bool,

    /// Extra delay added to every computation
    #[arg(long, default_value_t = 0)]
    extra_delay_ms: u64,

    /// Abort after serving this many frames
    #[arg(long)]
    crash_after_frames: Option<u64>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    let faults = FaultConfig {
        crash_on_start: args.crash_on_start,
        hang_on_start: args.hang_on_start,
        extra_delay: Duration::from_millis(args.extra_delay_ms),
        crash_after_frames: args.crash_after_frames,
    };
    if faults.is_enabled() {
        warn!(?faults, "fault injection armed");
    }
    match faults.start_fault() {
        StartFault::Crash => {
            error!("crash-on-start: aborting");
            std::process::abort();
        }
        StartFault::Hang => {
            warn!("hang-on-start: never becoming ready");
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
        StartFault::None => {}
    }

    let addr = format!("{}:{}", args.host, args.port);
    let server = match Server::bind(addr.as_str()).await {
        Ok(server) => server,
        Err(e) => {
            error!(%addr, error = %e, "bind failed");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = ?server.local_addr().ok(), "worker listening");

    let notifier = match args.ready.as_deref() {
        None => None,
        Some(value) => match ReadyNotifier::parse(value) {
            Some(n) => Some(n),
            None => {
                error!(value, "unrecognised readiness mechanism");
                return ExitCode::FAILURE;
            }
        },
    };
    if let Some(notifier) = &notifier {
        if let Err(e) = notifier.signal() {
            error!(error = %e, ?notifier, "readiness signal failed");
            return ExitCode::FAILURE;
        }
        info!(?notifier, "readiness signalled");
    }

    let service = WorkerService::new(
        server,
        WorkerConfig {
            compute_delay: Duration::from_millis(args.compute_delay_ms),
            faults,
            ..WorkerConfig::default()
        },
    );
    let token = CancellationToken::new();
    let run = service.run(token.clone());
    tokio::pin!(run);

    let exit = tokio::select! {
        exit = &mut run => exit,
        signal = shutdown_signal() => {
            info!(signal, processed = service.processed(), "shutting down");
            token.cancel();
            run.await
        }
    };

    match exit {
        WorkerExit::CrashRequested => {
            error!(processed = service.processed(), "crash-after-frames: aborting");
            std::process::abort();
        }
        WorkerExit::Cancelled => ExitCode::SUCCESS,
    }
}

/// Resolves on a termination signal; never resolves if handlers cannot be installed.
async fn shutdown_signal() -> &'static str {
    match algovisor::wait_for_shutdown_signal().await {
        Ok(name) => name,
        Err(e) => {
            warn!(error = %e, "signal handlers unavailable");
            std::future::pending().await
        }
    }
}
