/// Update coordinator: owns the recurring fetch → validate → publish cycle
/// for one config entry.
///
/// ## Publishing
///
/// The current `Snapshot` lives behind a `tokio::sync::watch` channel.
/// A successful refresh swaps in a new `Arc<Snapshot>` in one step, so
/// readers (sensors, the endpoint) see either the old or the new dataset,
/// never a mix. Subscribers are woken on every publish, including failed
/// ticks, which only flip `last_update_success` and keep the dataset.
///
/// ## Scheduling
///
/// One task per entry, ticking every `update_interval` (30 minutes by
/// default). The first tick fires one full period after creation because
/// entry setup has already fetched. Failures neither delay nor accelerate
/// the next tick.

use crate::ingest::{fetch_dataset, WaterSource};
use crate::model::{Dataset, SetupError, UpdateError};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// What listeners see after each refresh attempt.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Records from the last successful fetch.
    pub dataset: Arc<Dataset>,
    /// Outcome of the most recent refresh attempt.
    pub last_update_success: bool,
    /// When `dataset` was fetched.
    pub last_updated: DateTime<Utc>,
    /// Error text of the most recent failed attempt, cleared on success.
    pub last_error: Option<String>,
}

impl Snapshot {
    fn fresh(dataset: Dataset) -> Self {
        Self {
            dataset: Arc::new(dataset),
            last_update_success: true,
            last_updated: Utc::now(),
            last_error: None,
        }
    }

    fn failed(&self, error: &UpdateError) -> Self {
        Self {
            dataset: Arc::clone(&self.dataset),
            last_update_success: false,
            last_updated: self.last_updated,
            last_error: Some(error.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct UpdateCoordinator {
    name: String,
    source: Arc<dyn WaterSource>,
    update_interval: Duration,
    tx: watch::Sender<Arc<Snapshot>>,
    /// Serializes refreshes: at most one fetch in flight.
    refresh_lock: tokio::sync::Mutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateCoordinator {
    /// Coordinator seeded with an already validated dataset.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn WaterSource>,
        update_interval: Duration,
        initial: Dataset,
    ) -> Arc<Self> {
        let (tx, _rx) = watch::channel(Arc::new(Snapshot::fresh(initial)));
        Arc::new(Self {
            name: name.into(),
            source,
            update_interval,
            tx,
            refresh_lock: tokio::sync::Mutex::new(()),
            task: Mutex::new(None),
        })
    }

    /// Fetches once and builds the coordinator from the result.
    ///
    /// # Errors
    /// `SetupError::NotReady` when the fetch or validation fails; no
    /// coordinator is created in that case.
    pub async fn first_refresh(
        name: impl Into<String>,
        source: Arc<dyn WaterSource>,
        update_interval: Duration,
    ) -> Result<Arc<Self>, SetupError> {
        let name = name.into();
        let dataset = fetch_dataset(source.as_ref()).await.map_err(|e| {
            log::error!("Initial {} fetch failed: {}", name, e);
            e
        })?;
        log::debug!("Initial {} fetch returned {} records", name, dataset.len());
        Ok(Self::new(name, source, update_interval, dataset))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.tx.borrow())
    }

    pub fn last_update_success(&self) -> bool {
        self.tx.borrow().last_update_success
    }

    /// Receiver woken on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// Runs one fetch + validate cycle and publishes the outcome.
    ///
    /// On failure the previous dataset stays published; the error is
    /// returned for the caller's information only.
    pub async fn refresh(&self) -> Result<(), UpdateError> {
        let _guard = self.refresh_lock.lock().await;
        let was_successful = self.last_update_success();

        match fetch_dataset(self.source.as_ref()).await {
            Ok(dataset) => {
                if !was_successful {
                    log::info!("Fetching {} data recovered", self.name);
                }
                log::debug!("Finished fetching {} data: {} records", self.name, dataset.len());
                self.tx.send_replace(Arc::new(Snapshot::fresh(dataset)));
                Ok(())
            }
            Err(error) => {
                if was_successful {
                    log::warn!("Error fetching {} data: {}", self.name, error);
                } else {
                    log::debug!("Error fetching {} data: {}", self.name, error);
                }
                self.tx.send_modify(|snapshot| *snapshot = Arc::new(snapshot.failed(&error)));
                Err(error)
            }
        }
    }

    /// Starts the periodic refresh task. Calling it again while the task
    /// runs has no effect.
    pub fn start(self: &Arc<Self>) {
        let Ok(mut task) = self.task.lock() else {
            log::error!("{} coordinator task lock poisoned", self.name);
            return;
        };
        if task.is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.update_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                // Failures are already logged and published.
                let _ = coordinator.refresh().await;
            }
        }));
        log::debug!("{} coordinator scheduled every {:?}", self.name, period);
    }

    /// Stops the periodic task. Listeners keep the last snapshot.
    pub fn shutdown(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
                log::debug!("{} coordinator stopped", self.name);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for UpdateCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use crate::model::{FetchError, PayloadError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays queued responses; repeats the last one when the queue runs dry.
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Value, FetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Value, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WaterSource for ScriptedSource {
        async fn fetch(&self) -> Result<Value, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                match responses.front().unwrap() {
                    Ok(value) => Ok(value.clone()),
                    Err(_) => Err(FetchError::Timeout(Duration::from_secs(10))),
                }
            }
        }
    }

    fn json(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    fn tisza(temp: &str) -> Value {
        serde_json::json!({ "data": [{ "type": "river", "nameOfRiver": "Tisza", "avgTemp": temp }] })
    }

    #[tokio::test]
    async fn test_first_refresh_seeds_dataset() {
        let source = ScriptedSource::new(vec![Ok(json(fixture_full_payload_json()))]);
        let coordinator = UpdateCoordinator::first_refresh("test", source.clone(), Duration::from_secs(60))
            .await
            .expect("valid payload");

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.dataset.len(), 3);
        assert!(snapshot.last_update_success);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_first_refresh_failure_is_not_ready() {
        let source = ScriptedSource::new(vec![Ok(serde_json::json!({ "data": [] }))]);
        let result = UpdateCoordinator::first_refresh("test", source, Duration::from_secs(60)).await;

        assert!(
            matches!(
                result,
                Err(SetupError::NotReady(UpdateError::Payload(PayloadError::EmptyData)))
            ),
            "empty data should abort setup"
        );
    }

    #[tokio::test]
    async fn test_successful_refresh_replaces_dataset() {
        let source = ScriptedSource::new(vec![Ok(tisza("11.0")), Ok(tisza("13.5"))]);
        let coordinator = UpdateCoordinator::first_refresh("test", source, Duration::from_secs(60))
            .await
            .unwrap();
        let mut rx = coordinator.subscribe();

        coordinator.refresh().await.expect("second payload is valid");

        assert!(rx.has_changed().unwrap(), "listeners must be notified");
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.dataset[0].avg_temp, Some(13.5));
        assert!(snapshot.last_update_success);
    }

    #[tokio::test]
    async fn test_timeout_keeps_previous_dataset() {
        let source = ScriptedSource::new(vec![
            Ok(tisza("11.0")),
            Err(FetchError::Timeout(Duration::from_secs(10))),
        ]);
        let coordinator = UpdateCoordinator::first_refresh("test", source, Duration::from_secs(60))
            .await
            .unwrap();
        let before = coordinator.snapshot();

        let result = coordinator.refresh().await;

        assert!(matches!(result, Err(UpdateError::Fetch(FetchError::Timeout(_)))));
        let after = coordinator.snapshot();
        assert!(Arc::ptr_eq(&before.dataset, &after.dataset), "dataset must be untouched");
        assert_eq!(after.dataset[0].avg_temp, Some(11.0));
        assert!(!after.last_update_success);
        assert!(after.last_error.as_deref().unwrap_or_default().contains("timed out"));
        assert_eq!(after.last_updated, before.last_updated);
    }

    #[tokio::test]
    async fn test_recovery_clears_failure() {
        let source = ScriptedSource::new(vec![
            Ok(tisza("11.0")),
            Ok(serde_json::json!({ "nope": true })),
            Ok(tisza("12.0")),
        ]);
        let coordinator = UpdateCoordinator::first_refresh("test", source, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(coordinator.refresh().await.is_err());
        assert!(!coordinator.last_update_success());

        coordinator.refresh().await.expect("third payload is valid");
        let snapshot = coordinator.snapshot();
        assert!(snapshot.last_update_success);
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.dataset[0].avg_temp, Some(12.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_refreshes_each_period() {
        let period = Duration::from_secs(30 * 60);
        let source = ScriptedSource::new(vec![Ok(tisza("11.0")), Ok(tisza("12.0"))]);
        let coordinator = UpdateCoordinator::first_refresh("test", source.clone(), period)
            .await
            .unwrap();
        coordinator.start();
        assert!(coordinator.is_running());

        tokio::time::sleep(period - Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1, "no tick before a full period");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.calls(), 2, "one tick after a full period");
        assert_eq!(coordinator.snapshot().dataset[0].avg_temp, Some(12.0));

        tokio::time::sleep(period).await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_does_not_stop_timer() {
        let period = Duration::from_secs(60);
        let source = ScriptedSource::new(vec![
            Ok(tisza("11.0")),
            Err(FetchError::Status(500)),
            Ok(tisza("14.0")),
        ]);
        let coordinator = UpdateCoordinator::first_refresh("test", source.clone(), period)
            .await
            .unwrap();
        coordinator.start();

        tokio::time::sleep(period + Duration::from_secs(1)).await;
        assert!(!coordinator.last_update_success());
        assert_eq!(coordinator.snapshot().dataset[0].avg_temp, Some(11.0));

        tokio::time::sleep(period).await;
        assert!(coordinator.last_update_success());
        assert_eq!(coordinator.snapshot().dataset[0].avg_temp, Some(14.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticks() {
        let period = Duration::from_secs(60);
        let source = ScriptedSource::new(vec![Ok(tisza("11.0"))]);
        let coordinator = UpdateCoordinator::first_refresh("test", source.clone(), period)
            .await
            .unwrap();
        coordinator.start();
        coordinator.shutdown();

        tokio::time::sleep(period * 3).await;
        assert_eq!(source.calls(), 1);
        assert!(!coordinator.is_running());
    }
}
