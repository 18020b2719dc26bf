//! Headless controller: launches and supervises `algo_worker`, runs the
//! control loop, and logs a status line periodically.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use algovisor::{
    BackoffPolicy, Config, LogWriter, ReadinessSignal, RestartPolicy, RuntimeBuilder, Subscribe,
    WorkerCommand, init_logging,
};
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "controller")]
#[command(about = "Supervises the compute worker and drives the control loop", long_about = None)]
struct Args {
    /// Worker address
    #[arg(long, env = "ALGOVISOR_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Worker port
    #[arg(long, env = "ALGOVISOR_PORT", default_value_t = 45678)]
    port: u16,

    /// Worker executable (default: `algo_worker` next to this binary)
    #[arg(long)]
    worker: Option<PathBuf>,

    /// Extra argument passed to the worker (repeatable)
    #[arg(long = "worker-arg", allow_hyphen_values = true)]
    worker_args: Vec<String>,

    /// Readiness mechanism: `pipe` or `event:<name>`
    #[arg(long, default_value = "pipe", value_parser = parse_readiness)]
    ready: ReadinessSignal,

    #[arg(long, default_value_t = 500)]
    connect_timeout_ms: u64,

    #[arg(long, default_value_t = 3000)]
    ready_timeout_ms: u64,

    #[arg(long, default_value_t = 200)]
    heartbeat_interval_ms: u64,

    #[arg(long, default_value_t = 500)]
    heartbeat_timeout_ms: u64,

    /// Consecutive missed heartbeats before the worker is unhealthy
    #[arg(long, default_value_t = 3)]
    miss_threshold: u32,

    /// How many rounds late a pong may be and still count
    #[arg(long, default_value_t = 2)]
    pong_tolerance: u64,

    #[arg(long, default_value_t = 10)]
    max_restarts: u64,

    #[arg(long, default_value_t = 500)]
    restart_backoff_ms: u64,

    #[arg(long, default_value_t = 200.0)]
    control_rate_hz: f64,

    #[arg(long, default_value_t = 200.0)]
    sensor_rate_hz: f64,

    /// Period of the status log line; 0 disables it
    #[arg(long, default_value_t = 1000)]
    status_interval_ms: u64,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_readiness(value: &str) -> Result<ReadinessSignal, String> {
    match value {
        "pipe" => Ok(ReadinessSignal::PipeByte),
        v => match v.strip_prefix("event:") {
            Some(name) if !name.is_empty() => Ok(ReadinessSignal::NamedEvent {
                name: name.to_string(),
            }),
            _ => Err(format!("expected `pipe` or `event:<name>`, got `{v}`")),
        },
    }
}

fn default_worker() -> PathBuf {
    let name = format!("algo_worker{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .map(|exe| exe.with_file_name(&name))
        .unwrap_or_else(|_| PathBuf::from(name))
}

impl Args {
    fn into_config(self) -> Config {
        let mut cfg = Config::default();
        cfg.worker_addr = SocketAddr::new(self.host, self.port);
        cfg.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        cfg.ready_timeout = Duration::from_millis(self.ready_timeout_ms);

        let mut args = vec![
            "--host".to_string(),
            self.host.to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        args.extend(self.worker_args);
        cfg.worker = WorkerCommand {
            program: self.worker.unwrap_or_else(default_worker),
            args,
            readiness: self.ready,
            ..WorkerCommand::default()
        };

        cfg.heartbeat.interval = Duration::from_millis(self.heartbeat_interval_ms);
        cfg.heartbeat.timeout = Duration::from_millis(self.heartbeat_timeout_ms);
        cfg.heartbeat.miss_threshold = self.miss_threshold;
        cfg.heartbeat.pong_tolerance = self.pong_tolerance;
        cfg.restart = RestartPolicy {
            max_restarts: self.max_restarts,
            backoff: BackoffPolicy::constant(Duration::from_millis(self.restart_backoff_ms)),
        };
        cfg.control.rate_hz = self.control_rate_hz;
        cfg.sensor_rate_hz = self.sensor_rate_hz;
        cfg
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);
    let status_interval = Duration::from_millis(args.status_interval_ms);
    let cfg = args.into_config();
    info!(
        worker = %cfg.worker.program.display(),
        addr = %cfg.worker_addr,
        ready = %cfg.worker.readiness.env_value(),
        "controller starting"
    );

    let runtime = RuntimeBuilder::new(cfg)
        .with_subscribers(vec![Arc::new(LogWriter) as Arc<dyn Subscribe>])
        .build();
    runtime.start();

    let signal = algovisor::wait_for_shutdown_signal();
    tokio::pin!(signal);
    let mut ticker = (!status_interval.is_zero()).then(|| tokio::time::interval(status_interval));

    let code = loop {
        tokio::select! {
            res = &mut signal => {
                match res {
                    Ok(name) => {
                        info!(signal = name, "shutdown requested");
                        break ExitCode::SUCCESS;
                    }
                    Err(e) => {
                        error!(error = %e, "cannot install signal handlers");
                        break ExitCode::FAILURE;
                    }
                }
            }
            _ = async {
                match ticker.as_mut() {
                    Some(t) => { t.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                let s = runtime.status();
                let line = format!(
                    "state={} health={} error={} seq={} rtt_ms={:.2} timeouts={} restarts={} cmd={:.4} pos={:.4}",
                    s.system_state.as_str(),
                    s.algo_health.as_str(),
                    s.last_error.code(),
                    s.sensor_seq,
                    s.heartbeat_rtt_ms,
                    s.heartbeat_timeouts,
                    s.algo_restarts,
                    s.last_command,
                    s.actuator_position,
                );
                if s.system_state == algovisor::SystemState::Degraded {
                    warn!("{line}");
                } else {
                    info!("{line}");
                }
            }
        }
    };

    runtime.stop().await;
    info!("controller stopped");
    code
}
