// # API Availability Monitor
//
// Periodically probes the backend and reports connectivity transitions.
//
// ## Timing
//
// - First probe after `initial_delay`
// - Then every `connected_interval` while reachable, every
//   `disconnected_interval` while unreachable
// - Probes never overlap and are bounded by `probe_timeout`
//
// ## Usage
//
// ```rust,ignore
// let (monitor, mut events) = ConnectionMonitor::new(probe, HealthConfig::default());
// tokio::spawn(async move { monitor.run_until(shutdown).await });
// while let Some(event) = events.recv().await {
//     if event == MonitorEvent::Established {
//         handle.send(&ControlMessage::Refresh);
//     }
// }
// ```

use crate::config::HealthConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Checks whether the backend API is reachable
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Succeeds when the API answered
    async fn probe(&self) -> Result<()>;
}

/// Snapshot of the monitor's view of the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthState {
    /// At least one probe has completed
    pub initiated: bool,
    /// Whether the API is considered reachable
    pub connected: bool,
}

impl Default for HealthState {
    // Optimistic until the first probe says otherwise.
    fn default() -> Self {
        Self {
            initiated: false,
            connected: true,
        }
    }
}

/// Connectivity transitions and refresh triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The API became reachable again
    Established,
    /// The API stopped answering
    Lost { reason: String },
    /// The configured refresh interval elapsed
    Refresh,
}

pub struct ConnectionMonitor {
    probe: Arc<dyn HealthProbe>,
    config: HealthConfig,
    state: watch::Sender<HealthState>,
    events: mpsc::Sender<MonitorEvent>,
}

impl ConnectionMonitor {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        config: HealthConfig,
    ) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let (state, _) = watch::channel(HealthState::default());
        (
            Self {
                probe,
                config,
                state,
                events,
            },
            events_rx,
        )
    }

    /// Watch the current health state
    pub fn state(&self) -> watch::Receiver<HealthState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    /// Probe until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let next_probe = tokio::time::sleep(self.config.initial_delay());
        tokio::pin!(next_probe);

        let mut refresh = self.config.refresh_interval().map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        info!(
            initial_delay_ms = self.config.initial_delay_ms,
            refresh_secs = ?self.config.refresh_interval_secs,
            "Connection monitor started"
        );

        'run: loop {
            tokio::select! {
                _ = &mut shutdown => break 'run,

                _ = &mut next_probe => {
                    let connected = tokio::select! {
                        _ = &mut shutdown => break 'run,
                        connected = self.check() => connected,
                    };
                    next_probe
                        .as_mut()
                        .reset(Instant::now() + self.config.interval(connected));
                }

                _ = next_refresh(&mut refresh) => {
                    debug!("Refresh interval elapsed");
                    self.emit(MonitorEvent::Refresh);
                }
            }
        }

        info!("Connection monitor stopped");
    }

    /// Run one probe and publish the resulting transition
    ///
    /// Returns whether the API is reachable.
    async fn check(&self) -> bool {
        let result = tokio::time::timeout(self.config.probe_timeout(), self.probe.probe()).await;
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(Error::timeout(format!(
                "health probe gave no answer within {}s",
                self.config.probe_timeout_secs
            ))),
        };

        let previous = *self.state.borrow();
        let connected = failure.is_none();
        self.state.send_replace(HealthState {
            initiated: true,
            connected,
        });

        match failure {
            None if !previous.connected => {
                info!("API reachable again");
                self.emit(MonitorEvent::Established);
            }
            None => debug!("API probe succeeded"),
            Some(e) if previous.connected => {
                warn!(error = %e, "API unreachable");
                self.emit(MonitorEvent::Lost {
                    reason: e.to_string(),
                });
            }
            Some(e) => debug!(error = %e, "API still unreachable"),
        }

        connected
    }

    fn emit(&self, event: MonitorEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.events.try_send(event) {
            warn!("Monitor event channel full, dropping event");
        }
    }
}

async fn next_refresh(refresh: &mut Option<Interval>) {
    match refresh {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
