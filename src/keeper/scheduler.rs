//! Task scheduling with per-cycle retry.
//!
//! One loop per registered task: run immediately once, then on a fixed
//! interval until shutdown. A failing cycle is retried a configured number
//! of times with a cancellable sleep in between; exhausting the budget is
//! terminal for that cycle only. The next tick fires as usual, and one
//! task's failures never touch another task's loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// One schedulable unit of keeper work.
pub trait Task: Send + Sync {
    /// Run one cycle. Errors reach the scheduler's retry wrapper.
    fn execute(&self) -> BoxFuture<'_, Result<()>>;
}

/// Retry policy applied to every registered task.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt of a cycle.
    pub attempts: u32,
    /// Sleep between attempts; raced against shutdown.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

struct Entry {
    name: String,
    task: Arc<dyn Task>,
    interval: Duration,
}

/// Cloneable handle that stops a running [`Scheduler`]. Stopping twice is
/// a no-op.
#[derive(Clone)]
pub struct SchedulerStopper {
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerStopper {
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send_replace(true);
    }
}

pub struct Scheduler {
    entries: Vec<Entry>,
    policy: RetryPolicy,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            entries: Vec::new(),
            policy,
            shutdown_tx,
        }
    }

    /// Register `task` under `name` with a fixed polling interval.
    /// Re-registering a name before `run` replaces the stored entry
    /// (last write wins).
    pub fn register_task(&mut self, name: &str, task: Arc<dyn Task>, interval: Duration) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            info!("⏱️ task '{name}' re-registered — replacing previous entry");
            entry.task = task;
            entry.interval = interval;
            return;
        }
        self.entries.push(Entry {
            name: name.to_string(),
            task,
            interval,
        });
    }

    /// Shutdown signal threaded through tasks so they can stop between
    /// markets.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn stopper(&self) -> SchedulerStopper {
        SchedulerStopper {
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    /// Signal every task loop to stop. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send_replace(true);
    }

    /// Launch one loop per registered task and block until `stop()` is
    /// called, then wait for every loop to finish: no task body is left
    /// running when this returns.
    pub async fn run(&self) {
        info!(
            "⏱️ scheduler starting | tasks={} retry_attempts={} retry_delay={:?}",
            self.entries.len(),
            self.policy.attempts,
            self.policy.delay,
        );

        let mut set = JoinSet::new();
        for entry in &self.entries {
            set.spawn(task_loop(
                entry.name.clone(),
                entry.task.clone(),
                entry.interval,
                self.policy.clone(),
                self.shutdown_tx.subscribe(),
            ));
        }

        let mut shutdown = self.shutdown_tx.subscribe();
        let _ = shutdown.wait_for(|stopped| *stopped).await;

        while set.join_next().await.is_some() {}
        info!("⏱️ scheduler stopped — all task loops drained");
    }
}

async fn task_loop(
    name: String,
    task: Arc<dyn Task>,
    interval: Duration,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
) {
    info!("⏱️ task '{name}' loop started | interval={interval:?}");
    let mut ticker = tokio::time::interval(interval);
    // A cycle can outlast the interval; run the next one when it ends
    // instead of bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }
        let mut stop_wait = shutdown.clone();
        tokio::select! {
            _ = ticker.tick() => {
                execute_task(&name, task.as_ref(), &policy, &shutdown).await;
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = async { let _ = stop_wait.wait_for(|stopped| *stopped).await; } => break,
        }
    }
    info!("⏱️ task '{name}' loop stopped");
}

/// Run one cycle of `task`, retrying failures under the policy. Never
/// propagates: a cycle that exhausts its retries is logged as terminal and
/// the loop moves on to the next tick.
async fn execute_task(
    name: &str,
    task: &dyn Task,
    policy: &RetryPolicy,
    shutdown: &watch::Receiver<bool>,
) {
    let mut attempt = 0u32;
    loop {
        match task.execute().await {
            Ok(()) => {
                if attempt > 0 {
                    info!("✅ task '{name}' succeeded on retry {attempt}");
                } else {
                    debug!("✅ task '{name}' cycle complete");
                }
                return;
            }
            Err(err) => {
                if *shutdown.borrow() {
                    warn!("🛑 task '{name}' failed during shutdown — not retrying: {err:#}");
                    return;
                }
                if attempt >= policy.attempts {
                    error!(
                        "❌ task '{name}' failed after {attempt} retr{}: {err:#} — giving up until the next tick",
                        if attempt == 1 { "y" } else { "ies" },
                    );
                    return;
                }
                attempt += 1;
                warn!(
                    "⚠️ task '{name}' attempt {attempt}/{} failed: {err:#} — retrying in {:?}",
                    policy.attempts, policy.delay,
                );

                let mut stop_wait = shutdown.clone();
                tokio::select! {
                    _ = tokio::time::sleep(policy.delay) => {}
                    _ = stop_wait.wait_for(|stopped| *stopped) => {
                        warn!("🛑 task '{name}' retry sleep interrupted by shutdown");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingTask {
        runs: Arc<AtomicU32>,
    }

    impl Task for CountingTask {
        fn execute(&self) -> BoxFuture<'_, Result<()>> {
            let runs = self.runs.clone();
            Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    struct FailingTask {
        runs: Arc<AtomicU32>,
        succeed_after: u32,
    }

    impl Task for FailingTask {
        fn execute(&self) -> BoxFuture<'_, Result<()>> {
            let runs = self.runs.clone();
            let succeed_after = self.succeed_after;
            Box::pin(async move {
                let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
                if run > succeed_after {
                    Ok(())
                } else {
                    anyhow::bail!("simulated failure {run}")
                }
            })
        }
    }

    fn counting(runs: &Arc<AtomicU32>) -> Arc<dyn Task> {
        Arc::new(CountingTask { runs: runs.clone() })
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_task_runs_immediately_and_on_interval() {
        let runs = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(quick_policy());
        scheduler.register_task("count", counting(&runs), Duration::from_millis(25));

        let scheduler = Arc::new(scheduler);
        let stopper = scheduler.stopper();
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(runs.load(Ordering::SeqCst) >= 1, "first run is immediate");

        tokio::time::sleep(Duration::from_millis(60)).await;
        stopper.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop promptly")
            .unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_reregistering_a_name_replaces_the_task() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let mut scheduler = Scheduler::new(quick_policy());
        scheduler.register_task("job", counting(&first), Duration::from_millis(10));
        scheduler.register_task("job", counting(&second), Duration::from_millis(10));
        assert_eq!(scheduler.entries.len(), 1);

        let scheduler = Arc::new(scheduler);
        let stopper = scheduler.stopper();
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        stopper.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0, "replaced task never runs");
        assert!(second.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let scheduler = Scheduler::new(quick_policy());
        scheduler.stop();
        scheduler.stop();

        // run() after stop returns immediately with nothing left behind.
        tokio::time::timeout(Duration::from_millis(100), scheduler.run())
            .await
            .expect("run should return once stopped");
    }

    #[tokio::test]
    async fn test_retry_until_budget_exhausted() {
        let runs = Arc::new(AtomicU32::new(0));
        let task = FailingTask {
            runs: runs.clone(),
            succeed_after: u32::MAX,
        };
        let (_tx, shutdown) = watch::channel(false);

        execute_task("flaky", &task, &quick_policy(), &shutdown).await;

        // Initial attempt + two retries.
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_recovers_before_budget_exhausted() {
        let runs = Arc::new(AtomicU32::new(0));
        let task = FailingTask {
            runs: runs.clone(),
            succeed_after: 1,
        };
        let (_tx, shutdown) = watch::channel(false);

        execute_task("flaky", &task, &quick_policy(), &shutdown).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_sleep_is_cancelled_by_shutdown() {
        let runs = Arc::new(AtomicU32::new(0));
        let task = FailingTask {
            runs: runs.clone(),
            succeed_after: u32::MAX,
        };
        let policy = RetryPolicy {
            attempts: 5,
            delay: Duration::from_secs(60),
        };
        let (tx, shutdown) = watch::channel(false);

        let exec = tokio::spawn(async move {
            execute_task("flaky", &task, &policy, &shutdown).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.send(true);

        // The 60s retry sleep must be abandoned immediately.
        tokio::time::timeout(Duration::from_millis(200), exec)
            .await
            .expect("retry sleep should abort on shutdown")
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_when_shutdown_already_signalled() {
        let runs = Arc::new(AtomicU32::new(0));
        let task = FailingTask {
            runs: runs.clone(),
            succeed_after: u32::MAX,
        };
        let (tx, shutdown) = watch::channel(false);
        let _ = tx.send(true);

        execute_task("flaky", &task, &quick_policy(), &shutdown).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1, "no retries after shutdown");
    }

    #[tokio::test]
    async fn test_failing_task_does_not_block_other_tasks() {
        let healthy = Arc::new(AtomicU32::new(0));
        let flaky_runs = Arc::new(AtomicU32::new(0));

        let mut scheduler = Scheduler::new(RetryPolicy {
            attempts: 1,
            delay: Duration::from_millis(5),
        });
        scheduler.register_task(
            "flaky",
            Arc::new(FailingTask {
                runs: flaky_runs.clone(),
                succeed_after: u32::MAX,
            }),
            Duration::from_millis(10),
        );
        scheduler.register_task("healthy", counting(&healthy), Duration::from_millis(10));

        let scheduler = Arc::new(scheduler);
        let stopper = scheduler.stopper();
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        stopper.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(flaky_runs.load(Ordering::SeqCst) >= 2);
        assert!(healthy.load(Ordering::SeqCst) >= 2, "healthy task kept ticking");
    }
}
