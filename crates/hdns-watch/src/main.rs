// # hdns-watch - hdns Terminal Watcher
//
// Keeps live streams to an hdns backend open and logs the current address,
// the managed records and (optionally) resolution results of one record.
//
// This binary is a THIN integration layer: reconnects, backoff, fan-out and
// health detection all live in hdns-core. It only wires the WebSocket
// transport and HTTP probe into the core and renders what comes out.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// - `HDNS_API_URL`: Base URL of the API (default `http://localhost:8080/api/`)
// - `HDNS_RESOLVE_RECORD`: Record id whose resolution results to watch
// - `HDNS_REFRESH_SECS`: Periodic refresh interval, 10..=300 seconds
// - `HDNS_MAX_RECONNECT_ATTEMPTS`: Reconnect budget per stream (default unlimited)
// - `HDNS_BACKOFF_BASE_MS`: First reconnect delay
// - `HDNS_BACKOFF_MAX_MS`: Upper bound for reconnect delays
// - `HDNS_LOG_LEVEL`: trace, debug, info, warn or error
//
// ## Example
//
// ```bash
// export HDNS_API_URL=https://dns.home.example/api/
// export HDNS_RESOLVE_RECORD=3
// export HDNS_REFRESH_SECS=60
//
// hdns-watch
// ```

use anyhow::{Context, Result};
use hdns_core::endpoint::ApiEndpoint;
use hdns_core::model::{
    Address, ControlMessage, IpFamily, Record, Resolution, ResolutionError,
};
use hdns_core::notify::{NotificationCenter, Severity};
use hdns_core::{
    ClientConfig, ConnectionMonitor, ConnectionState, MessageStream, MonitorEvent, StreamClient,
    StreamError, StreamEvent, StreamHandle,
};
use hdns_probe_http::HttpHealthProbe;
use hdns_transport_ws::WsConnector;
use std::env;
use std::fmt::Display;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum WatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WatchExitCode> for ExitCode {
    fn from(code: WatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    client: ClientConfig,
    resolve_record: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut client = ClientConfig::default();

        if let Some(url) = lookup("HDNS_API_URL") {
            client.api_url = url;
        }
        if let Some(base) = parse_var(&lookup, "HDNS_BACKOFF_BASE_MS")? {
            client.stream.backoff_base_ms = base;
        }
        if let Some(max) = parse_var(&lookup, "HDNS_BACKOFF_MAX_MS")? {
            client.stream.max_backoff_ms = max;
        }
        client.stream.max_attempts = parse_var(&lookup, "HDNS_MAX_RECONNECT_ATTEMPTS")?;
        client.health.refresh_interval_secs = parse_var(&lookup, "HDNS_REFRESH_SECS")?;

        Ok(Self {
            client,
            resolve_record: parse_var(&lookup, "HDNS_RESOLVE_RECORD")?,
            log_level: lookup("HDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.client.validate()?;

        ApiEndpoint::parse(&self.client.api_url).with_context(|| {
            format!(
                "HDNS_API_URL must be an http(s) or ws(s) URL. Got: {}",
                self.client.api_url
            )
        })?;

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "HDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

/// Parse an optional variable; empty values count as unset
fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} must be a non-negative number. Got '{}': {}", name, raw, e)),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return WatchExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WatchExitCode::ConfigError.into();
    }

    info!("Starting hdns-watch");

    // Streams are cooperative; one thread is plenty.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_watch(config).await {
            error!("Watcher error: {:#}", e);
            WatchExitCode::RuntimeError
        } else {
            WatchExitCode::CleanShutdown
        }
    });

    result.into()
}

/// The streams this watcher keeps open
struct Streams {
    address: StreamHandle<Option<Address>, ControlMessage>,
    records: StreamHandle<Vec<Record>, ControlMessage>,
    resolve: Option<StreamHandle<Vec<Resolution>, ControlMessage>>,
}

impl Streams {
    /// Ask every stream for the current state
    ///
    /// Streams without a live socket drop the request; they refresh on
    /// their own once connected.
    fn refresh_all(&self) {
        self.address.send(&ControlMessage::Refresh);
        self.records.send(&ControlMessage::Refresh);
        if let Some(resolve) = &self.resolve {
            resolve.send(&ControlMessage::Refresh);
        }
    }

    fn close_all(&self) {
        self.address.close();
        self.records.close();
        if let Some(resolve) = &self.resolve {
            resolve.close();
        }
    }
}

/// Run the watcher until a shutdown signal arrives
async fn run_watch(config: Config) -> Result<()> {
    let endpoint = ApiEndpoint::parse(&config.client.api_url)?;
    let client = StreamClient::new(
        Arc::new(WsConnector::new()),
        endpoint.clone(),
        config.client.stream.clone(),
    )?;
    let probe = Arc::new(HttpHealthProbe::new(&endpoint)?);
    let (monitor, mut monitor_events) = ConnectionMonitor::new(probe, config.client.health.clone());
    let mut notifications = NotificationCenter::new(config.client.notify.clone());

    let (address, address_events) = client.address()?;
    let (records, record_events) = client.records()?;
    spawn_event_logger(address.resource().to_string(), address_events);
    spawn_event_logger(records.resource().to_string(), record_events);

    let resolve = match config.resolve_record {
        Some(record_id) => {
            let (handle, events) = client.resolve(record_id)?;
            spawn_event_logger(handle.resource().to_string(), events);
            Some(handle)
        }
        None => None,
    };

    let streams = Streams {
        address,
        records,
        resolve,
    };
    refresh_on_connect(&streams.address);
    refresh_on_connect(&streams.records);
    if let Some(resolve) = &streams.resolve {
        refresh_on_connect(resolve);
    }

    let mut addresses = streams.address.messages();
    let mut record_updates = streams.records.messages();
    let mut resolutions = streams.resolve.as_ref().map(|handle| handle.messages());

    let (monitor_stop, monitor_stop_rx) = oneshot::channel::<()>();
    let monitor_task = tokio::spawn(async move {
        monitor
            .run_until(async {
                let _ = monitor_stop_rx.await;
            })
            .await;
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    info!(api = %endpoint, resolve = ?config.resolve_record, "Watching hdns backend");

    let result = loop {
        tokio::select! {
            signal = &mut shutdown => {
                match signal {
                    Ok(name) => {
                        info!("Received shutdown signal: {}", name);
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                }
            }

            Some(update) = addresses.next() => match update {
                Ok(Some(address)) => report_address(&address),
                Ok(None) => info!("No public address known yet"),
                Err(e) => stream_failed(&mut notifications, "Address", &e),
            },

            Some(update) = record_updates.next() => match update {
                Ok(records) => report_records(&records),
                Err(e) => stream_failed(&mut notifications, "Record", &e),
            },

            Some(update) = next_or_pending(&mut resolutions) => match update {
                Ok(results) => report_resolutions(&results),
                Err(e) => stream_failed(&mut notifications, "Resolution", &e),
            },

            Some(event) = monitor_events.recv() => match event {
                MonitorEvent::Established => {
                    notifications.present("Connection established", "The hdns API is reachable again");
                    streams.refresh_all();
                }
                MonitorEvent::Lost { reason } => {
                    notifications.present_error("Connection lost", reason);
                }
                MonitorEvent::Refresh => {
                    debug!("Periodic refresh");
                    streams.refresh_all();
                }
            },

            _ = ticker.tick() => show_notifications(&mut notifications),
        }
    };

    info!("Shutting down hdns-watch");
    streams.close_all();
    let _ = monitor_stop.send(());
    if let Err(e) = monitor_task.await {
        warn!("Connection monitor ended abnormally: {}", e);
    }

    result
}

/// Send a refresh request whenever the stream (re)connects
fn refresh_on_connect<In>(handle: &StreamHandle<In, ControlMessage>)
where
    In: Clone + Send + 'static,
{
    let handle = handle.clone();
    let mut state = handle.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            match current {
                ConnectionState::Connected => handle.send(&ControlMessage::Refresh),
                ConnectionState::Closed => break,
                _ => {}
            }
        }
    });
}

fn spawn_event_logger(resource: String, mut events: mpsc::Receiver<StreamEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(resource = %resource, event = ?event, "Stream event");
        }
    });
}

async fn next_or_pending<T>(
    stream: &mut Option<MessageStream<T>>,
) -> Option<std::result::Result<T, StreamError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

fn report_address(address: &Address) {
    let family = IpFamily::of(&address.ip).map_or("unknown", |f| f.label());
    info!(
        ip = %address.ip,
        family,
        since = %address.updated_at.to_rfc3339(),
        "Current public address"
    );
}

fn report_records(records: &[Record]) {
    info!(count = records.len(), "Records updated");
    for record in records {
        let ip = record.address.as_ref().map_or("-", |a| a.ip.as_str());
        info!(record = %record.fqdn(), ip, ttl = record.ttl, "Record");
    }
}

fn report_resolutions(results: &[Resolution]) {
    for result in results {
        if result.is_success() {
            info!(
                server = %result.server,
                addresses = ?result.addresses,
                response_time = result.response_time,
                "Resolved"
            );
        } else {
            let reason = result.error.as_ref().map(ResolutionError::message);
            warn!(
                server = %result.server,
                error = reason.unwrap_or_default(),
                "Resolution failed"
            );
        }
    }
}

fn stream_failed(notifications: &mut NotificationCenter, name: &str, error: &StreamError) {
    error!(stream = name, error = %error, "Stream stopped");
    notifications.present_error(format!("{} stream stopped", name), error.to_string());
}

/// Advance the notification center and render what became visible
fn show_notifications(center: &mut NotificationCenter) {
    let report = center.tick(Instant::now());

    if let Some(id) = report.shown
        && let Some(shown) = center.active().iter().find(|n| n.id == id)
    {
        match shown.severity {
            Severity::Info => info!(title = %shown.title, "{}", shown.message),
            Severity::Error => warn!(title = %shown.title, detail = ?shown.detail, "{}", shown.message),
        }
    }
    if !report.evicted.is_empty() {
        debug!(evicted = report.evicted.len(), pending = center.pending(), "Notifications evicted");
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let config = config_from(&[]).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.client.api_url, "http://localhost:8080/api/");
        assert_eq!(config.client.stream.max_attempts, None);
        assert_eq!(config.resolve_record, None);
    }

    #[test]
    fn reads_stream_and_refresh_settings() {
        let config = config_from(&[
            ("HDNS_API_URL", "https://dns.example/api/"),
            ("HDNS_MAX_RECONNECT_ATTEMPTS", "5"),
            ("HDNS_BACKOFF_BASE_MS", "500"),
            ("HDNS_REFRESH_SECS", "60"),
            ("HDNS_RESOLVE_RECORD", "3"),
        ])
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.client.stream.max_attempts, Some(5));
        assert_eq!(config.client.stream.backoff_base_ms, 500);
        assert_eq!(config.client.health.refresh_interval_secs, Some(60));
        assert_eq!(config.resolve_record, Some(3));
    }

    #[test]
    fn rejects_out_of_range_refresh_interval() {
        let config = config_from(&[("HDNS_REFRESH_SECS", "5")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_numbers_and_levels() {
        assert!(config_from(&[("HDNS_MAX_RECONNECT_ATTEMPTS", "many")]).is_err());

        let config = config_from(&[("HDNS_LOG_LEVEL", "loud")]).unwrap();
        assert!(config.validate().is_err());

        let config = config_from(&[("HDNS_API_URL", "ftp://example.org/")]).unwrap();
        assert!(config.validate().is_err());
    }
}
