//! Process-wide outbound request budget: a concurrency cap shared by every
//! run plus a minimum interval between requests to the same host.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::BudgetSettings;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("outbound request budget exhausted after waiting {waited_ms} ms")]
pub struct BudgetExhausted {
    pub waited_ms: u64,
}

pub struct OutboundBudget {
    permits: Arc<Semaphore>,
    next_slot: Mutex<HashMap<String, Instant>>,
    per_host_interval: Duration,
    queue_timeout: Duration,
}

/// Held for the duration of one request.
pub struct BudgetPermit {
    _permit: OwnedSemaphorePermit,
}

impl OutboundBudget {
    pub fn new(settings: &BudgetSettings) -> Self {
        OutboundBudget {
            permits: Arc::new(Semaphore::new(settings.max_concurrent_requests.max(1))),
            next_slot: Mutex::new(HashMap::new()),
            per_host_interval: Duration::from_millis(settings.per_host_interval_ms),
            queue_timeout: Duration::from_millis(settings.queue_timeout_ms),
        }
    }

    /// Wait for a free slot and for `host`'s pacing interval. Requests that
    /// cannot get a slot within the queue timeout are rejected.
    pub async fn acquire(&self, host: &str) -> Result<BudgetPermit, BudgetExhausted> {
        let permit = tokio::time::timeout(self.queue_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| BudgetExhausted {
                waited_ms: self.queue_timeout.as_millis() as u64,
            })?
            .map_err(|_| BudgetExhausted { waited_ms: 0 })?;

        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            slots.retain(|_, next| *next > now);
            let slot = slots
                .get(host)
                .copied()
                .filter(|s| *s > now)
                .unwrap_or(now);
            slots.insert(host.to_string(), slot + self.per_host_interval);
            slot
        };
        tokio::time::sleep_until(slot).await;

        Ok(BudgetPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    #[cfg(test)]
    async fn paced_hosts(&self) -> usize {
        self.next_slot.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(max: usize, interval_ms: u64, queue_ms: u64) -> OutboundBudget {
        OutboundBudget::new(&BudgetSettings {
            max_concurrent_requests: max,
            per_host_interval_ms: interval_ms,
            queue_timeout_ms: queue_ms,
        })
    }

    #[tokio::test]
    async fn rejects_when_queue_times_out() {
        let b = budget(1, 0, 20);
        let _held = b.acquire("a.test").await.unwrap();
        let err = b.acquire("b.test").await.err().unwrap();
        assert_eq!(err.waited_ms, 20);
    }

    #[tokio::test]
    async fn permit_released_on_drop() {
        let b = budget(1, 0, 20);
        {
            let _p = b.acquire("a.test").await.unwrap();
            assert_eq!(b.available(), 0);
        }
        assert_eq!(b.available(), 1);
        assert!(b.acquire("a.test").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn paces_same_host() {
        let b = budget(4, 500, 1_000);
        let start = Instant::now();
        let _a = b.acquire("a.test").await.unwrap();
        let _b = b.acquire("a.test").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
        let other = Instant::now();
        let _c = b.acquire("b.test").await.unwrap();
        assert!(other.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_host_slots_pruned() {
        let b = budget(4, 100, 1_000);
        for host in ["a.test", "b.test", "c.test"] {
            let _p = b.acquire(host).await.unwrap();
        }
        assert_eq!(b.paced_hosts().await, 3);

        tokio::time::advance(Duration::from_millis(150)).await;
        let _p = b.acquire("d.test").await.unwrap();
        assert_eq!(b.paced_hosts().await, 1);
    }
}
