//! NVMe drive-health monitor daemon
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        nvme-monitor                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ sysfs GPIO / │───▶│    Poll      │───▶│ LED manager, │       │
//! │  │   i2c-dev    │    │  Scheduler   │    │  inventory   │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{header, Response, StatusCode};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nvme_monitor::adapters::{I2cDevTransport, LoggingEventPublisher, SysfsGpioSource};
use nvme_monitor::config::{load_slot_configs, MonitorConfig, DEFAULT_CONFIG_PATH};
use nvme_monitor::domain::{DrivePublisher, LedService};
use nvme_monitor::error::{Error, Result};
use nvme_monitor::metrics::MonitorMetrics;
use nvme_monitor::monitor::{
    DriveRegistry, LedArbitrator, PollScheduler, RetryPolicy, SignalReader, TelemetryClient,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// NVMe drive-health monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Slot configuration file
    #[arg(long, env = "NVME_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Poll interval in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "1000")]
    interval_ms: u64,

    /// Attempts per presence/power-good read
    #[arg(long, env = "SIGNAL_RETRIES", default_value = "3")]
    signal_retries: u32,

    /// Delay between signal read attempts in milliseconds
    #[arg(long, env = "SIGNAL_RETRY_DELAY_MS", default_value = "100")]
    signal_retry_delay_ms: u64,

    /// Root of the sysfs GPIO tree
    #[arg(long, env = "GPIO_BASE", default_value = "/sys/class/gpio")]
    gpio_base: PathBuf,

    /// Device node prefix of the management buses
    #[arg(long, env = "I2C_PREFIX", default_value = "/dev/i2c-")]
    i2c_prefix: String,

    /// Drive management address (decimal or 0x-prefixed hex)
    #[arg(long, env = "DRIVE_ADDRESS", default_value = "0x6a", value_parser = parse_address)]
    drive_address: u8,

    /// Health and metrics server bind address (disabled when unset)
    #[arg(long, env = "HTTP_ADDR")]
    http_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            config_path: self.config.clone(),
            poll_interval: Duration::from_millis(self.interval_ms.max(1)),
            signal_retry: RetryPolicy::new(
                self.signal_retries,
                Duration::from_millis(self.signal_retry_delay_ms),
            ),
            gpio_base: self.gpio_base.clone(),
            i2c_prefix: self.i2c_prefix.clone(),
            drive_address: self.drive_address,
        }
    }
}

fn parse_address(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid drive address {:?}: {}", s, e))
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = args.monitor_config();

    info!("Starting NVMe drive-health monitor");
    info!("  Config file: {}", config.config_path.display());
    info!("  Poll interval: {:?}", config.poll_interval);
    info!(
        "  Signal retries: {} x {:?}",
        config.signal_retry.max_attempts, config.signal_retry.delay
    );
    info!("  Drive address: {:#04x}", config.drive_address);

    let slots = load_slot_configs(&config.config_path);
    info!("Loaded {} drive slot(s)", slots.len());

    let metrics = Arc::new(MonitorMetrics::new()?);
    let (leds, publisher) = build_services().await?;

    let signals = SignalReader::new(
        Arc::new(SysfsGpioSource::new(&config.gpio_base)),
        config.signal_retry,
    );
    let telemetry = TelemetryClient::new(Arc::new(I2cDevTransport::new(
        config.i2c_prefix.clone(),
        config.drive_address,
    )));

    let mut scheduler = PollScheduler::new(
        slots,
        signals,
        telemetry,
        LedArbitrator::new(leds),
        DriveRegistry::new(publisher),
        Arc::new(LoggingEventPublisher::info_level()),
    )
    .with_metrics(Arc::clone(&metrics))
    .with_interval(config.poll_interval);

    if let Some(addr) = args.http_addr.clone() {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(e) = run_http_server(&addr, metrics).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    scheduler.run(shutdown_signal()).await;

    info!("NVMe monitor shutdown complete");
    Ok(())
}

#[cfg(feature = "dbus")]
async fn build_services() -> Result<(Arc<dyn LedService>, Arc<dyn DrivePublisher>)> {
    use nvme_monitor::adapters::{DbusInventoryPublisher, DbusLedService};

    let connection = zbus::Connection::system().await?;
    info!("Connected to system bus");

    Ok((
        Arc::new(DbusLedService::new(connection.clone())),
        Arc::new(DbusInventoryPublisher::new(connection)),
    ))
}

#[cfg(not(feature = "dbus"))]
async fn build_services() -> Result<(Arc<dyn LedService>, Arc<dyn DrivePublisher>)> {
    use nvme_monitor::adapters::{LoggingDrivePublisher, LoggingLedService};

    info!("Built without D-Bus support, LED and inventory calls are logged only");
    Ok((
        Arc::new(LoggingLedService::new()),
        Arc::new(LoggingDrivePublisher::new()),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Can not listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Can not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "zbus=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health and Metrics Server
// =============================================================================

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Route one request. `/readyz` turns ready after the first completed pass.
fn respond(path: &str, metrics: &MonitorMetrics) -> Response<Full<Bytes>> {
    match path {
        "/healthz" | "/livez" => text_response(StatusCode::OK, "ok"),
        "/readyz" if metrics.is_ready() => text_response(StatusCode::OK, "ok"),
        "/readyz" => text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
        "/metrics" => match metrics.encode() {
            Ok((content_type, body)) => {
                let mut response = text_response(StatusCode::OK, body);
                if let Ok(value) = header::HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                error!("Can not encode metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
            }
        },
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn run_http_server(addr: &str, metrics: Arc<MonitorMetrics>) -> Result<()> {
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid HTTP server address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind HTTP server: {}", e)))?;

    info!("Health and metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("HTTP server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                let response = respond(req.uri().path(), &metrics);
                async move { Ok::<_, std::convert::Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("HTTP connection error: {}", e);
            }
        });
    }
}
