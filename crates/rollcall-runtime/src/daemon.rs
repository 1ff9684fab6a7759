//! Daemon wiring: one reconciler, three ingestion channels, one set of
//! consolidated timers.
//!
//! All periodic work runs off a single select loop so the whole timer
//! surface is visible in one place: the 1 Hz reconciler tick (durations,
//! grace windows, queue deadline), the relay store re-read, the upstream
//! pull, and the 10 s staleness watchdog.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{Duration, interval};

use rollcall_core::config::EngineConfig;
use rollcall_engine::reconciler::Reconciler;
use rollcall_source_bridge::source::BridgeReader;
use rollcall_source_poll::source::PollSource;
use rollcall_source_push::source::PushSource;

use crate::cli::DaemonOpts;
use crate::client;
use crate::server;

/// Shared daemon state protected by a mutex.
pub struct DaemonState {
    pub reconciler: Reconciler,
    pub push: PushSource,
    pub bridge: BridgeReader,
    pub poll: PollSource,
}

impl DaemonState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            reconciler: Reconciler::new(config),
            push: PushSource::new(),
            bridge: BridgeReader::new(),
            poll: PollSource::new(),
        }
    }
}

/// Engine tunables with the CLI interval overrides applied.
fn engine_config(opts: &DaemonOpts) -> EngineConfig {
    EngineConfig {
        bridge_interval_ms: opts.bridge_interval_ms,
        pull_interval_ms: opts.pull_interval_ms,
        ..EngineConfig::default()
    }
}

/// Timer periods for the select loop: reconciler tick, relay store
/// re-read, upstream pull, staleness watchdog. Sub-second floors keep a
/// misconfigured interval from busy-looping.
fn timer_periods(config: &EngineConfig) -> (Duration, Duration, Duration, Duration) {
    (
        Duration::from_millis(config.tick_interval_ms.max(100)),
        Duration::from_millis(config.bridge_interval_ms.max(100)),
        Duration::from_millis(config.pull_interval_ms.max(100)),
        Duration::from_secs(config.watchdog_interval_secs.max(1)),
    )
}

/// Run the daemon: ingestion timers plus UDS server, until a shutdown
/// signal arrives.
pub async fn run_daemon(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let config = engine_config(&opts);
    let state = Arc::new(Mutex::new(DaemonState::new(config)));

    let server_state = Arc::clone(&state);
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_state).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    let timer_state = Arc::clone(&state);
    let timer_handle = tokio::spawn(async move {
        run_timers(timer_state, opts).await;
    });

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = timer_handle => {
            tracing::warn!("timer loop exited unexpectedly");
        }
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}

async fn run_timers(state: Arc<Mutex<DaemonState>>, opts: DaemonOpts) {
    let (tick_period, bridge_period, pull_period, watchdog_period) = {
        let st = state.lock().await;
        timer_periods(st.reconciler.config())
    };
    let mut tick = interval(tick_period);
    let mut bridge_timer = interval(bridge_period);
    let mut pull_timer = interval(pull_period);
    let mut watchdog = interval(watchdog_period);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                state.lock().await.reconciler.tick(Utc::now());
            }
            _ = bridge_timer.tick() => {
                if let Some(ref store) = opts.bridge_store {
                    bridge_tick(&state, store).await;
                }
            }
            _ = pull_timer.tick() => {
                if let Some(ref upstream) = opts.upstream_socket {
                    pull_tick(&state, upstream).await;
                }
            }
            _ = watchdog.tick() => {
                state.lock().await.reconciler.watchdog(Utc::now());
            }
        }
    }
}

/// Re-read the relay store and fold any fresh snapshot into the
/// reconciler. A missing store file is normal before the companion
/// process starts.
async fn bridge_tick(state: &Arc<Mutex<DaemonState>>, store_path: &str) {
    let raw = match tokio::fs::read_to_string(store_path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!("relay store read failed: {e}");
            return;
        }
    };

    let now = Utc::now();
    let mut st = state.lock().await;
    match st.bridge.read(&raw, now) {
        Ok(Some(event)) => {
            let disposition = st.reconciler.apply_event(event, now);
            tracing::debug!("relay event: {disposition:?}");
        }
        Ok(None) => {}
        Err(e) => tracing::debug!("relay store unparseable: {e}"),
    }
}

/// Poll the upstream service for a full snapshot. The in-flight guard
/// means a slow upstream skips cycles instead of stacking requests.
async fn pull_tick(state: &Arc<Mutex<DaemonState>>, upstream_socket: &str) {
    {
        let mut st = state.lock().await;
        if !st.poll.begin() {
            return;
        }
    }

    let result = client::rpc_call(upstream_socket, "attendance.pull", serde_json::json!({})).await;

    let now = Utc::now();
    let mut st = state.lock().await;
    st.poll.finish();

    let body = match result {
        Ok(value) => value.to_string(),
        Err(e) => {
            tracing::debug!("upstream pull failed: {e}");
            return;
        }
    };

    match st.poll.accept_response(&body, now) {
        Ok(events) => {
            for event in events {
                st.reconciler.apply_event(event, now);
            }
        }
        Err(e) => tracing::warn!("upstream pull unparseable: {e}"),
    }
}
