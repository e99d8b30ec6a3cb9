//! Periodic eviction of idle participants.
//!
//! Each run evicts everyone whose last heartbeat is older than the TTL and
//! appends a leave notice for each of them. Runs are awaited one after another
//! on a single task, so they never overlap; ticks that fire while a run is
//! still going are dropped.

use crate::error::ChatError;
use crate::message::{MessageStore, NewMessage, LEAVE_NOTICE};
use crate::participant::{Participant, ParticipantRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Sweeper timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between runs.
    pub interval: Duration,
    /// Maximum inactivity before eviction.
    pub ttl: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            ttl: Duration::from_secs(10),
        }
    }
}

/// Shortest period the timer runs with; a zero interval is raised to this.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Evicts expired participants and announces their departure.
pub struct PresenceSweeper {
    registry: Arc<dyn ParticipantRegistry>,
    messages: Arc<dyn MessageStore>,
    membership: Arc<Mutex<()>>,
    config: SweeperConfig,
}

impl PresenceSweeper {
    pub(crate) fn new(
        registry: Arc<dyn ParticipantRegistry>,
        messages: Arc<dyn MessageStore>,
        membership: Arc<Mutex<()>>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            registry,
            messages,
            membership,
            config,
        }
    }

    /// Perform one sweep.
    ///
    /// Returns the evicted participants. A leave notice that cannot be
    /// appended is logged and skipped; the eviction itself stands.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry fails.
    pub async fn run_once(&self) -> Result<Vec<Participant>, ChatError> {
        let Some(cutoff) = Instant::now().checked_sub(self.config.ttl) else {
            return Ok(Vec::new());
        };

        let _membership = self.membership.lock().await;
        let evicted = self.registry.evict_expired(cutoff).await?;

        for participant in &evicted {
            let notice = NewMessage::status(participant.name.clone(), LEAVE_NOTICE);
            match self.messages.append(notice).await {
                Ok(id) => {
                    info!(participant = %participant.name, notice = %id, "Participant left");
                }
                Err(e) => {
                    error!(participant = %participant.name, error = %e, "Failed to append leave notice");
                }
            }
        }

        debug!(evicted = evicted.len(), "Sweep finished");
        Ok(evicted)
    }

    /// Start running on a timer.
    ///
    /// The first run happens one interval after start.
    #[must_use]
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let period = if self.config.interval.is_zero() {
            warn!(interval_ms = MIN_INTERVAL.as_millis() as u64, "Sweep interval is zero, raising it");
            MIN_INTERVAL
        } else {
            self.config.interval
        };

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            info!(
                interval_ms = period.as_millis() as u64,
                ttl_ms = self.config.ttl.as_millis() as u64,
                "Presence sweeper started"
            );

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => break,

                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Sweep failed");
                        }
                    }
                }
            }

            info!("Presence sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Controls a running sweeper.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop taking ticks and wait for an in-flight run to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Presence sweeper task ended abnormally");
        }
    }

    /// Check if the sweeper task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::message::{MemoryMessageStore, Message, MessageKind, BROADCAST, JOIN_NOTICE};
    use crate::participant::{MemoryRegistry, Registration};
    use crate::service::ChatService;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Registry whose evictions take a while to report back.
    struct SlowEvictions {
        inner: MemoryRegistry,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        runs: AtomicUsize,
    }

    impl SlowEvictions {
        fn new(delay: Duration) -> Self {
            Self {
                inner: MemoryRegistry::new(),
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ParticipantRegistry for SlowEvictions {
        async fn register(&self, name: &str) -> Result<Registration, StoreError> {
            self.inner.register(name).await
        }

        async fn heartbeat(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.heartbeat(name).await
        }

        async fn is_live(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.is_live(name).await
        }

        async fn list_live(&self) -> Result<Vec<Participant>, StoreError> {
            self.inner.list_live().await
        }

        async fn evict_expired(&self, cutoff: Instant) -> Result<Vec<Participant>, StoreError> {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);

            let evicted = self.inner.evict_expired(cutoff).await;
            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            evicted
        }

        async fn withdraw(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.withdraw(name).await
        }
    }

    fn service() -> (ChatService, Arc<MemoryRegistry>, Arc<MemoryMessageStore>) {
        let registry = Arc::new(MemoryRegistry::new());
        let messages = Arc::new(MemoryMessageStore::new());
        let service = ChatService::new(
            registry.clone(),
            messages.clone(),
            Default::default(),
        );
        (service, registry, messages)
    }

    async fn leave_notices(messages: &MemoryMessageStore) -> Vec<Message> {
        messages
            .query(&|m: &Message| m.text == LEAVE_NOTICE, None)
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_evicts_and_announces() {
        let (service, registry, messages) = service();
        service.register_participant(Some("Alice")).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        service.register_participant(Some("Bob")).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        let sweeper = service.sweeper(SweeperConfig::default());
        let evicted = sweeper.run_once().await.unwrap();

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].name, "Alice");
        assert_eq!(registry.count(), 1);

        let notices = leave_notices(&messages).await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].from, "Alice");
        assert_eq!(notices[0].to, BROADCAST);
        assert_eq!(notices[0].kind, MessageKind::Status);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_with_nothing_expired() {
        let (service, _, messages) = service();
        service.register_participant(Some("Alice")).await.unwrap();

        let evicted = service.sweeper(SweeperConfig::default()).run_once().await.unwrap();
        assert!(evicted.is_empty());
        assert!(leave_notices(&messages).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_evicts_idle_participant() {
        let (service, registry, messages) = service();
        service.register_participant(Some("Alice")).await.unwrap();

        let handle = service.sweeper(SweeperConfig::default()).start();
        tokio::time::sleep(Duration::from_secs(16)).await;

        assert_eq!(registry.count(), 0);
        assert_eq!(leave_notices(&messages).await.len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_participant() {
        let (service, registry, _) = service();
        service.register_participant(Some("Alice")).await.unwrap();

        let handle = service.sweeper(SweeperConfig::default()).start();
        tokio::time::sleep(Duration::from_secs(8)).await;
        service.heartbeat(Some("Alice")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(8)).await;

        assert_eq!(registry.count(), 1);
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticks() {
        let (service, registry, _) = service();
        let handle = service.sweeper(SweeperConfig::default()).start();
        handle.shutdown().await;

        service.register_participant(Some("Alice")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(registry.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_sweeps() {
        let (service, registry, messages) = service();
        service.register_participant(Some("Alice")).await.unwrap();

        let config = SweeperConfig {
            interval: Duration::ZERO,
            ttl: Duration::from_millis(10),
        };
        let handle = service.sweeper(config).start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!handle.is_finished());
        assert_eq!(registry.count(), 0);
        assert_eq!(leave_notices(&messages).await.len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_runs_never_overlap() {
        let registry = Arc::new(SlowEvictions::new(Duration::from_secs(3)));
        let service = ChatService::new(
            registry.clone(),
            Arc::new(MemoryMessageStore::new()),
            Default::default(),
        );

        let config = SweeperConfig {
            interval: Duration::from_secs(1),
            ttl: Duration::from_secs(10),
        };
        let handle = service.sweeper(config).start();
        tokio::time::sleep(Duration::from_secs(20)).await;
        handle.shutdown().await;

        assert!(registry.runs.load(Ordering::SeqCst) >= 2);
        assert_eq!(registry.peak.load(Ordering::SeqCst), 1);
        assert_eq!(registry.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_during_eviction_waits_for_leave_notice() {
        let registry = Arc::new(SlowEvictions::new(Duration::from_secs(1)));
        let messages = Arc::new(MemoryMessageStore::new());
        let service = ChatService::new(registry.clone(), messages.clone(), Default::default());

        service.register_participant(Some("Alice")).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        // The sweep evicts Alice, then stalls before announcing it.
        let sweeper = service.sweeper(SweeperConfig::default());
        let (swept, rejoined) = tokio::join!(sweeper.run_once(), async {
            tokio::task::yield_now().await;
            service.register_participant(Some("Alice")).await
        });

        assert_eq!(swept.unwrap().len(), 1);
        assert!(rejoined.is_ok());
        assert!(registry.is_live("Alice").await.unwrap());

        let notices: Vec<String> = messages
            .query(&|m: &Message| m.kind == MessageKind::Status && m.from == "Alice", None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(notices, [JOIN_NOTICE, LEAVE_NOTICE, JOIN_NOTICE]);
    }
}
