//! Liveness Pinger — periodic self health-check that keeps an idle-sleeping
//! host awake.
//!
//! State machine: `Idle --(initial delay)--> Armed --(every interval)--> Armed`.
//! Leaves `Armed` only through [`PingerHandle::stop`] or the process-wide
//! shutdown broadcast. A failed ping is logged and otherwise ignored; the
//! next attempt is simply the next tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parley_core::config::KeepAliveConfig;
use reqwest::Client;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingerState {
    /// Waiting out the initial delay.
    Idle,
    /// Recurring timer active.
    Armed,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PingerSettings {
    /// Full URL of the health-check endpoint, e.g. `https://host/ping`.
    pub target_url: String,
    pub initial_delay: Duration,
    pub interval: Duration,
    pub timeout: Duration,
}

impl PingerSettings {
    pub fn from_config(config: &KeepAliveConfig, port: u16) -> Self {
        Self {
            target_url: format!("{}/ping", config.target_base_url(port)),
            initial_delay: Duration::from_secs(config.initial_delay_seconds),
            interval: Duration::from_secs(config.interval_seconds.max(1)),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

pub struct LivenessPinger {
    client: Client,
    settings: PingerSettings,
}

impl LivenessPinger {
    pub fn new(settings: PingerSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }

    /// One health-check round trip. Returns the endpoint's JSON body.
    pub async fn ping_once(&self) -> Result<serde_json::Value, reqwest::Error> {
        self.client
            .get(&self.settings.target_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Start the background task. Only one pinger should run per process.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> PingerHandle {
        let (state_tx, state_rx) = watch::channel(PingerState::Idle);
        let (stop_tx, stop_rx) = oneshot::channel();
        let pings = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(self.run(state_tx, pings.clone(), stop_rx, shutdown));

        PingerHandle {
            state: state_rx,
            pings,
            stop_tx: Some(stop_tx),
            task,
        }
    }

    async fn run(
        self,
        state: watch::Sender<PingerState>,
        pings: Arc<AtomicU64>,
        mut stop: oneshot::Receiver<()>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        // A dropped handle detaches the task rather than stopping it.
        let mut detached = false;

        tokio::select! {
            _ = tokio::time::sleep(self.settings.initial_delay) => {}
            res = &mut stop => {
                if res.is_ok() {
                    state.send_replace(PingerState::Stopped);
                    return;
                }
                detached = true;
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.initial_delay) => {}
                    _ = shutdown.recv() => {
                        state.send_replace(PingerState::Stopped);
                        return;
                    }
                }
            }
            _ = shutdown.recv() => {
                state.send_replace(PingerState::Stopped);
                return;
            }
        }

        state.send_replace(PingerState::Armed);
        tracing::info!(
            "Keep-alive pinger armed (target: {}, interval: {}s)",
            self.settings.target_url,
            self.settings.interval.as_secs()
        );

        let interval = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Stop and shutdown win over a tick that came due during a slow ping.
            tokio::select! {
                biased;

                res = &mut stop, if !detached => {
                    if res.is_ok() {
                        break;
                    }
                    detached = true;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Keep-alive pinger shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    pings.fetch_add(1, Ordering::Relaxed);
                    match self.ping_once().await {
                        Ok(body) => tracing::info!("Keep-alive ping: {}", body),
                        Err(e) => tracing::warn!("Keep-alive ping failed: {}", e),
                    }
                }
            }
        }

        state.send_replace(PingerState::Stopped);
    }
}

/// Owner-side view of a running pinger.
pub struct PingerHandle {
    state: watch::Receiver<PingerState>,
    pings: Arc<AtomicU64>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PingerHandle {
    pub fn state(&self) -> PingerState {
        *self.state.borrow()
    }

    /// Number of pings attempted so far, successful or not.
    pub fn pings_sent(&self) -> u64 {
        self.pings.load(Ordering::Relaxed)
    }

    /// Stop the timer and wait for the task to finish.
    ///
    /// A ping already in flight is not cancelled: the stop request (and the
    /// shutdown broadcast) is seen only once that ping completes, which can
    /// take up to the ping timeout (`timeout_seconds`, 30 s by default).
    pub async fn stop(mut self) -> PingerState {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("Keep-alive task ended abnormally: {}", e);
        }
        *self.state.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer, initial_ms: u64, interval_ms: u64) -> PingerSettings {
        PingerSettings {
            target_url: format!("{}/ping", server.uri()),
            initial_delay: Duration::from_millis(initial_ms),
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_secs(2),
        }
    }

    async fn alive_server(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "status": "alive",
                "timestamp": "2026-10-18T00:00:00.000Z"
            })))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_settings_from_config_defaults() {
        let s = PingerSettings::from_config(&KeepAliveConfig::default(), 3001);
        assert_eq!(s.target_url, "http://localhost:3001/ping");
        assert_eq!(s.initial_delay, Duration::from_secs(300));
        assert_eq!(s.interval, Duration::from_secs(840));
    }

    #[tokio::test]
    async fn test_stays_idle_during_initial_delay() {
        let server = alive_server(200).await;
        let (_tx, rx) = broadcast::channel(1);
        let handle = LivenessPinger::new(settings(&server, 10_000, 50)).unwrap().spawn(rx);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(handle.state(), PingerState::Idle);
        assert_eq!(handle.pings_sent(), 0);
        assert!(server.received_requests().await.unwrap().is_empty());

        assert_eq!(handle.stop().await, PingerState::Stopped);
    }

    #[tokio::test]
    async fn test_arms_and_fires_repeatedly() {
        let server = alive_server(200).await;
        let (_tx, rx) = broadcast::channel(1);
        let handle = LivenessPinger::new(settings(&server, 20, 60)).unwrap().spawn(rx);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.state(), PingerState::Armed);
        assert!(handle.pings_sent() >= 2, "expected repeated pings, got {}", handle.pings_sent());

        let requests = server.received_requests().await.unwrap();
        assert!(requests.len() >= 2);
        assert!(requests.iter().all(|r| r.url.path() == "/ping"));

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_failed_pings_do_not_stop_the_timer() {
        let server = alive_server(503).await;
        let (_tx, rx) = broadcast::channel(1);
        let handle = LivenessPinger::new(settings(&server, 10, 50)).unwrap().spawn(rx);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(handle.state(), PingerState::Armed);
        assert!(handle.pings_sent() >= 2);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_broadcast_stops_pinger() {
        let server = alive_server(200).await;
        let (tx, rx) = broadcast::channel(1);
        let handle = LivenessPinger::new(settings(&server, 10, 50)).unwrap().spawn(rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(handle.state(), PingerState::Stopped);
        let sent = handle.pings_sent();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(handle.pings_sent(), sent);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_ping_up_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let (_tx, rx) = broadcast::channel(1);
        let handle = LivenessPinger::new(PingerSettings {
            timeout: Duration::from_millis(400),
            ..settings(&server, 10, 50)
        })
        .unwrap()
        .spawn(rx);

        // First tick at ~60ms; the ping then hangs until the timeout.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(handle.pings_sent(), 1);

        let started = Instant::now();
        assert_eq!(handle.stop().await, PingerState::Stopped);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(150), "stop returned after {:?}", waited);
        assert!(waited < Duration::from_secs(5), "stop returned after {:?}", waited);
    }

    #[tokio::test]
    async fn test_ping_once_returns_endpoint_body() {
        let server = alive_server(200).await;
        let pinger = LivenessPinger::new(settings(&server, 0, 1000)).unwrap();

        let body = pinger.ping_once().await.unwrap();
        assert_eq!(body["status"], "alive");
    }
}
