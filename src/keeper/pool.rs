//! Bounded worker pool for parallel settlement.
//!
//! A fixed set of workers pulls markets from a shared queue so one slow
//! receipt wait cannot block the rest of the cycle. Every submitted market
//! reports exactly one result; the pool returns only after all of them do.

use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::debug;

/// Aggregate outcome of one pool run. Partial failure is expected and is
/// reported, not escalated.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub attempted: usize,
    pub failed: usize,
    pub first_error: Option<String>,
}

impl PoolReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Process `items` with `min(max_concurrent, items.len())` workers.
///
/// A shutdown signal stops workers from starting queued items, which are
/// reported as cancellation failures; an item already being handled runs
/// to completion (its receipt wait is bounded on its own).
pub async fn process_markets<T, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    shutdown: watch::Receiver<bool>,
    handler: F,
) -> PoolReport
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return PoolReport::default();
    }
    let workers = max_concurrent.max(1).min(total);

    // Queue capacity equals the item count, so enqueueing never blocks.
    let (work_tx, work_rx) = mpsc::channel::<T>(total);
    for item in items {
        let _ = work_tx.send(item).await;
    }
    drop(work_tx);
    let work_rx = Arc::new(Mutex::new(work_rx));

    let (result_tx, mut result_rx) = mpsc::channel::<anyhow::Result<()>>(total);

    let mut set = JoinSet::new();
    for worker_id in 0..workers {
        let work_rx = work_rx.clone();
        let result_tx = result_tx.clone();
        let handler = handler.clone();
        let shutdown = shutdown.clone();
        set.spawn(async move {
            debug!("⚙️ settlement worker {worker_id} started");
            loop {
                let item = { work_rx.lock().await.recv().await };
                let Some(item) = item else { break };

                if *shutdown.borrow() {
                    let _ = result_tx
                        .send(Err(anyhow!("shutdown before the market was attempted")))
                        .await;
                    continue;
                }

                let _ = result_tx.send(handler(item).await).await;
            }
            debug!("⚙️ settlement worker {worker_id} finished");
        });
    }
    drop(result_tx);

    let mut report = PoolReport::default();
    while let Some(result) = result_rx.recv().await {
        report.attempted += 1;
        if let Err(err) = result {
            report.failed += 1;
            if report.first_error.is_none() {
                report.first_error = Some(format!("{err:#}"));
            }
        }
    }
    while set.join_next().await.is_some() {}

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn no_shutdown() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_all_markets_attempted_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_ref = calls.clone();
        let report = process_markets(vec![1, 2, 3, 4, 5], 2, no_shutdown(), move |_m: u32| {
            let calls = calls_ref.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(report.attempted, 5);
        assert_eq!(report.failed, 0);
        assert!(report.all_succeeded());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failure_count_and_first_error() {
        let report = process_markets(vec![1u32, 2, 3, 4, 5], 2, no_shutdown(), |m: u32| async move {
            if m % 2 == 0 {
                anyhow::bail!("market {m} broke")
            }
            Ok(())
        })
        .await;

        assert_eq!(report.attempted, 5);
        assert_eq!(report.failed, 2);
        assert!(report.first_error.unwrap().contains("broke"));
    }

    #[tokio::test]
    async fn test_concurrency_stays_under_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let in_flight_ref = in_flight.clone();
        let peak_ref = peak.clone();

        let report = process_markets(vec![0u32; 8], 2, no_shutdown(), move |_m| {
            let in_flight = in_flight_ref.clone();
            let peak = peak_ref.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert_eq!(report.attempted, 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_worker_count_capped_at_market_count() {
        // Two markets with a large cap still complete (only 2 workers spawn).
        let report = process_markets(vec![1u32, 2], 16, no_shutdown(), |_m| async { Ok(()) }).await;
        assert_eq!(report.attempted, 2);
    }

    #[tokio::test]
    async fn test_shutdown_reports_unstarted_markets_as_cancelled() {
        let (tx, rx) = watch::channel(true);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_ref = calls.clone();

        let report = process_markets(vec![1u32, 2, 3], 2, rx, move |_m| {
            let calls = calls_ref.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        drop(tx);

        // Every market still reports a result, none of them was started.
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(report.first_error.unwrap().contains("shutdown"));
    }

    #[tokio::test]
    async fn test_empty_input_is_a_noop() {
        let report = process_markets(Vec::<u32>::new(), 3, no_shutdown(), |_m| async { Ok(()) }).await;
        assert_eq!(report.attempted, 0);
        assert!(report.all_succeeded());
    }
}
