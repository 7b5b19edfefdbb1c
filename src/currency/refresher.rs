//! Periodic exchange rate refresh
//!
//! Runs one background task that force-refreshes the configured bases right
//! away and then once per interval until stopped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::CurrencyService;
use crate::Result;
use crate::models::CurrencyCode;

/// Something that can pull fresh rates for a base into the cache
#[async_trait]
pub trait RefreshRates: Send + Sync {
    async fn refresh(&self, base: &CurrencyCode) -> Result<()>;
}

#[async_trait]
impl RefreshRates for CurrencyService {
    async fn refresh(&self, base: &CurrencyCode) -> Result<()> {
        self.force_refresh(base).await.map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    pub interval: Duration,
    pub bases: Vec<CurrencyCode>,
}

struct Running {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

pub struct RateRefresher {
    target: Arc<dyn RefreshRates>,
    schedule: RefreshSchedule,
    running: Mutex<Option<Running>>,
}

impl RateRefresher {
    pub fn new(target: Arc<dyn RefreshRates>, schedule: RefreshSchedule) -> Self {
        Self {
            target,
            schedule,
            running: Mutex::new(None),
        }
    }

    /// Spawns the refresh task, replacing any task already running.
    pub fn start(&self) {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(refresh_loop(
            self.target.clone(),
            self.schedule.clone(),
            shutdown_rx,
        ));

        let previous = self
            .lock()
            .replace(Running { handle, shutdown });
        if let Some(previous) = previous {
            debug!("Restarting exchange rate refresher");
            previous.handle.abort();
        }

        info!(
            interval_secs = self.schedule.interval.as_secs(),
            bases = ?self.schedule.bases.iter().map(CurrencyCode::as_str).collect::<Vec<_>>(),
            "Exchange rate auto refresh started"
        );
    }

    /// Signals the task and waits for it to finish. A no-op when idle.
    pub async fn stop(&self) {
        let Some(running) = self.lock().take() else {
            return;
        };
        // The task may already be gone if it panicked; either way it is done.
        let _ = running.shutdown.send(());
        let _ = running.handle.await;
        info!("Exchange rate auto refresh stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for RateRefresher {
    fn drop(&mut self) {
        if let Some(running) = self.lock().take() {
            running.handle.abort();
        }
    }
}

async fn refresh_loop(
    target: Arc<dyn RefreshRates>,
    schedule: RefreshSchedule,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut interval = time::interval(schedule.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                for base in &schedule.bases {
                    match target.refresh(base).await {
                        Ok(()) => debug!(base = %base, "Scheduled rate refresh done"),
                        Err(e) => warn!(base = %base, error = %e, "Scheduled rate refresh failed"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlannerError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTarget {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RefreshRates for CountingTarget {
        async fn refresh(&self, _base: &CurrencyCode) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PlannerError::upstream("stub", Some(500), "down"));
            }
            Ok(())
        }
    }

    fn schedule(bases: &[&str]) -> RefreshSchedule {
        RefreshSchedule {
            interval: Duration::from_secs(3600),
            bases: bases.iter().map(|b| CurrencyCode::parse(b).unwrap()).collect(),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_immediately_then_per_interval() {
        let target = Arc::new(CountingTarget::default());
        let refresher = RateRefresher::new(target.clone(), schedule(&["PLN", "EUR"]));

        refresher.start();
        settle().await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 2);

        time::sleep(Duration::from_secs(3601)).await;
        settle().await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 4);

        refresher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_refreshes() {
        let target = Arc::new(CountingTarget::default());
        let refresher = RateRefresher::new(target.clone(), schedule(&["PLN"]));

        refresher.start();
        settle().await;
        assert!(refresher.is_running());

        refresher.stop().await;
        assert!(!refresher.is_running());

        time::sleep(Duration::from_secs(7200)).await;
        settle().await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);

        // Stopping twice is harmless
        refresher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let target = Arc::new(CountingTarget {
            fail: true,
            ..Default::default()
        });
        let refresher = RateRefresher::new(target.clone(), schedule(&["PLN"]));

        refresher.start();
        settle().await;
        time::sleep(Duration::from_secs(3601)).await;
        settle().await;

        assert_eq!(target.calls.load(Ordering::SeqCst), 2);
        assert!(refresher.is_running());
        refresher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_a_single_task() {
        let target = Arc::new(CountingTarget::default());
        let refresher = RateRefresher::new(target.clone(), schedule(&["PLN"]));

        refresher.start();
        settle().await;
        refresher.start();
        settle().await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 2);

        time::sleep(Duration::from_secs(3601)).await;
        settle().await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 3);

        refresher.stop().await;
    }
}
