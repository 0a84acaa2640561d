//! Energy gateway daemon entry point.
//!
//! Parses CLI arguments, loads the optional config file, wires up the
//! blackboard and its adapters, and runs the scheduler loop and the local
//! HTTP control surface concurrently until an interrupt signal arrives.

mod bootstrap_io;
mod handlers;
mod http_client_reqwest;
mod modbus;
mod network;
mod secure_element_stub;
mod wifi_scanner_stub;

use anyhow::{Context, Result};
use clap::Parser;
use gwcore::{
    Blackboard, Clock, OpenDeviceTask, PullSettingsTask, Scheduler, SchedulerConfig, Task,
    WebDispatchTask,
};
use shared::api::DeviceKind;
use shared::GatewayConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "energy-gateway")]
#[command(about = "Energy gateway daemon: Modbus inverter polling, batched authenticated upload, local onboarding HTTP surface", long_about = None)]
struct CliArgs {
    /// Path to an optional TOML config file
    #[arg(long = "config", value_name = "CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Override the local HTTP server bind host
    #[arg(long = "host", value_name = "HOST")]
    host: Option<String>,

    /// Override the local HTTP server bind port
    #[arg(long = "port", value_name = "PORT")]
    port: Option<u16>,

    /// Initial device address (host for tcp, serial path for rtu)
    #[arg(long = "device-address", value_name = "ADDRESS", requires_all = ["device_port", "device_type", "device_unit_id"])]
    device_address: Option<String>,

    /// Initial device port (ignored for rtu)
    #[arg(long = "device-port", value_name = "PORT")]
    device_port: Option<u16>,

    /// Initial device type
    #[arg(long = "device-type", value_name = "tcp|rtu")]
    device_type: Option<String>,

    /// Initial device Modbus unit id
    #[arg(long = "device-unit-id", value_name = "UNIT_ID")]
    device_unit_id: Option<u8>,

    /// Override the bootstrap file path
    #[arg(long = "bootstrap", value_name = "BOOTSTRAP_FILE")]
    bootstrap_path: Option<PathBuf>,
}

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily("./logs", "gateway.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gateway=info,core=info,shared=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(non_blocking)
        .init();

    guard
}

async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate());
        let sigint = signal(SignalKind::interrupt());
        match (sigterm, sigint) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("received SIGTERM"),
                    _ = sigint.recv() => info!("received SIGINT"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "failed to register signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn load_config(args: &CliArgs) -> Result<GatewayConfig> {
    let mut config = match &args.config_file {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            GatewayConfig::load_from_str(&contents)?
        }
        None => GatewayConfig::default(),
    };

    if let Some(host) = &args.host {
        config.http_host = host.clone();
    }
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(bootstrap_path) = &args.bootstrap_path {
        config.bootstrap_path = bootstrap_path.display().to_string();
    }

    config.validate()?;
    Ok(config)
}

fn parse_device_kind(raw: &str) -> Result<DeviceKind> {
    match raw {
        "tcp" => Ok(DeviceKind::Tcp),
        "rtu" => Ok(DeviceKind::Rtu),
        other => anyhow::bail!("unknown device type '{other}', expected 'tcp' or 'rtu'"),
    }
}

fn build_open_device_task(
    now: u64,
    bb: Arc<Blackboard>,
    config: &GatewayConfig,
    kind: DeviceKind,
    address: String,
    port: u16,
    unit_id: u8,
) -> Result<Box<dyn Task>> {
    let session: Arc<dyn gwcore::DeviceSession> = match kind {
        DeviceKind::Tcp => Arc::new(modbus::ModbusSession::tcp(address.clone(), port, unit_id)?),
        DeviceKind::Rtu => Arc::new(modbus::ModbusSession::rtu(address.clone(), 9600, unit_id)),
    };
    let device_id = bootstrap_io::encode_device_id(kind, &address, port, unit_id);
    Ok(Box::new(OpenDeviceTask::new(
        now,
        bb,
        device_id,
        kind,
        session,
        config.open_retry_delay_ms,
        config.initial_harvest_delay_ms,
        config.batch_size,
        config.backoff_min_ms,
        config.backoff_max_ms,
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _logging_guard = init_logging();
    let args = CliArgs::parse();
    info!("energy gateway starting up");

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let http_client = match http_client_reqwest::ReqwestHttpClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            std::process::exit(1);
        }
    };
    let secure_element = Arc::new(secure_element_stub::SoftwareSecureElement::new(
        "energy-gateway-dev",
        b"change-me-in-production",
    ));

    let (bb, submission_rx) = Blackboard::new(
        config.http_port,
        config.upload_url.clone(),
        config.settings_url.clone(),
        secure_element,
        http_client,
        config.submission_channel_buffer_size,
    );
    let bb = Arc::new(bb);

    bootstrap_io::register_bootstrap_listener(&bb, config.bootstrap_path.clone()).await;

    let clock = Clock::new();
    let now = clock.now_ms();
    let mut initial_tasks: Vec<Box<dyn Task>> = vec![
        Box::new(WebDispatchTask::new(
            now,
            submission_rx,
            config.web_dispatch_batch_size,
            config.web_dispatch_interval_ms,
        )),
        Box::new(PullSettingsTask::new(
            now + config.settings_pull_interval_ms,
            bb.clone(),
            config.settings_pull_interval_ms,
        )),
    ];

    if let Some(address) = &args.device_address {
        let kind = parse_device_kind(args.device_type.as_deref().unwrap_or("tcp"))?;
        let port = args.device_port.unwrap_or(502);
        let unit_id = args.device_unit_id.unwrap_or(1);
        match build_open_device_task(now, bb.clone(), &config, kind, address.clone(), port, unit_id) {
            Ok(task) => initial_tasks.push(task),
            Err(e) => warn!(error = %e, "failed to set up the CLI-specified initial device"),
        }
    }

    for entry in bootstrap_io::load_bootstrap_entries(&config.bootstrap_path) {
        match build_open_device_task(
            now,
            bb.clone(),
            &config,
            entry.kind,
            entry.address.clone(),
            entry.port,
            entry.unit_id,
        ) {
            Ok(task) => initial_tasks.push(task),
            Err(e) => warn!(error = %e, address = %entry.address, "failed to set up a bootstrap device"),
        }
    }

    let (shutdown_tx, scheduler_shutdown_rx) = tokio::sync::broadcast::channel(1);
    let scheduler_config = SchedulerConfig {
        epsilon_ms: config.scheduler_epsilon_ms,
        past_due_clamp_ms: config.past_due_clamp_ms,
    };
    let scheduler = Scheduler::new(clock, initial_tasks, scheduler_config, scheduler_shutdown_rx);
    let scheduler_handle = tokio::spawn(scheduler.run());

    let app_state = handlers::AppState {
        blackboard: bb.clone(),
        wifi_scanner: Arc::new(wifi_scanner_stub::NullWifiScanner),
        retry_delay_ms: config.open_retry_delay_ms,
        initial_harvest_delay_ms: config.initial_harvest_delay_ms,
        batch_size: config.batch_size,
        backoff_min_ms: config.backoff_min_ms,
        backoff_max_ms: config.backoff_max_ms,
    };
    let app = handlers::create_router(app_state);
    let listen_addr = format!("{}:{}", config.http_host, config.http_port);
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding local HTTP server to {listen_addr}"))?;
    info!(addr = %listen_addr, "local HTTP control surface listening");

    let http_shutdown_rx = shutdown_tx.subscribe();
    let http_shutdown = async move {
        let mut rx = http_shutdown_rx;
        let _ = rx.recv().await;
        info!("HTTP server received shutdown signal");
    };
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(http_shutdown)
            .await
    });

    setup_shutdown_signal().await;
    info!("shutting down energy gateway");
    let _ = shutdown_tx.send(());

    let shutdown_timeout = std::time::Duration::from_secs(config.graceful_shutdown_timeout_secs);
    if tokio::time::timeout(shutdown_timeout, scheduler_handle).await.is_err() {
        warn!("scheduler did not stop within the graceful shutdown timeout");
    }
    for session in bb.remove_all_devices().await {
        session.close().await;
    }
    if let Ok(Err(e)) = tokio::time::timeout(shutdown_timeout, server_handle).await {
        error!(error = %e, "HTTP server exited with an error");
    }

    info!("energy gateway shutdown complete");
    Ok(())
}
