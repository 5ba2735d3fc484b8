//! Tests for the scheduler state machine and its driver.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use proptest::prelude::*;
    use tokio::time::Instant;

    use crate::error::{Result, SyncError};
    use crate::integrations::Service;
    use crate::sync::scheduler::*;
    use crate::sync::types::SyncJob;

    const DEBOUNCE: Duration = Duration::from_millis(1200);

    fn scheduler() -> Scheduler {
        Scheduler::new(
            DEBOUNCE,
            Backoff::new(Duration::from_millis(1000), Duration::from_millis(60_000)),
        )
    }

    fn job(key: &str) -> SyncJob {
        SyncJob::from_key(key)
    }

    #[test]
    fn test_idle_until_enqueue() {
        let mut s = scheduler();
        let now = Instant::now();
        assert_eq!(s.state(), SchedulerState::Idle);
        assert_eq!(s.next_deadline(), None);
        assert_eq!(s.begin_flush(now + Duration::from_secs(60)), None);

        s.enqueue(job("a:b"), now);
        assert_eq!(s.state(), SchedulerState::Debouncing);
        assert_eq!(s.next_deadline(), Some(now + DEBOUNCE));
    }

    #[test]
    fn test_enqueue_restarts_debounce() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.enqueue(job("a:b"), t0);
        s.enqueue(job("c:d"), t0 + Duration::from_millis(1000));

        assert_eq!(s.begin_flush(t0 + DEBOUNCE), None);
        let batch = s.begin_flush(t0 + Duration::from_millis(2200)).unwrap();
        assert_eq!(batch, vec![job("a:b"), job("c:d")]);
        assert_eq!(s.state(), SchedulerState::Flushing);
        assert_eq!(s.pending().count(), 0);
    }

    #[test]
    fn test_single_flush_in_flight() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.enqueue(job("a:b"), t0);
        let batch = s.begin_flush(t0 + DEBOUNCE).unwrap();

        // Arrives mid-flush: waits, is not lost, and does not start a second flush.
        s.enqueue(job("c:d"), t0 + DEBOUNCE);
        assert_eq!(s.begin_flush(t0 + Duration::from_secs(10)), None);

        assert_eq!(s.finish_flush(batch, true, t0 + Duration::from_secs(10)), None);
        assert_eq!(s.state(), SchedulerState::Debouncing);
        let next = s.begin_flush(t0 + Duration::from_secs(10)).unwrap();
        assert_eq!(next, vec![job("c:d")]);
    }

    #[test]
    fn test_failed_flush_requeues_whole_batch() {
        let mut s = scheduler();
        let t0 = Instant::now();
        s.enqueue(job("a:b"), t0);
        s.enqueue(job("c:d"), t0);
        let batch = s.begin_flush(t0 + DEBOUNCE).unwrap();
        s.enqueue(job("e:f"), t0 + DEBOUNCE);

        let t1 = t0 + Duration::from_secs(2);
        let wait = s.finish_flush(batch, false, t1).unwrap();
        assert_eq!(wait, Duration::from_millis(2000));
        assert_eq!(s.state(), SchedulerState::BackoffWait);
        let pending: Vec<_> = s.pending().cloned().collect();
        assert_eq!(pending, vec![job("a:b"), job("c:d"), job("e:f")]);

        // New work during backoff does not move the retry.
        s.enqueue(job("g:h"), t1 + Duration::from_millis(500));
        assert_eq!(s.next_deadline(), Some(t1 + wait));
        assert_eq!(s.begin_flush(t1 + Duration::from_millis(1999)), None);
        assert_eq!(s.begin_flush(t1 + wait).unwrap().len(), 4);
    }

    #[test]
    fn test_success_resets_backoff() {
        let mut s = scheduler();
        let mut now = Instant::now();
        s.enqueue(job("a:b"), now);
        for _ in 0..3 {
            now += Duration::from_secs(120);
            let batch = s.begin_flush(now).unwrap();
            s.finish_flush(batch, false, now);
        }
        assert_eq!(s.backoff().failures(), 3);

        now += Duration::from_secs(120);
        let batch = s.begin_flush(now).unwrap();
        s.finish_flush(batch, true, now);
        assert_eq!(s.state(), SchedulerState::Idle);
        assert_eq!(s.backoff().failures(), 0);
        assert_eq!(s.backoff().current(), Duration::from_millis(1000));
    }

    #[test]
    fn test_oversized_waits_are_clamped() {
        let mut s = Scheduler::new(
            Duration::MAX,
            Backoff::new(Duration::from_millis(1), Duration::MAX),
        );
        let mut now = Instant::now();
        s.enqueue(job("a:b"), now);
        assert_eq!(s.next_deadline(), Some(now + MAX_WAIT));

        for _ in 0..70 {
            now += MAX_WAIT;
            let batch = s.begin_flush(now).unwrap();
            s.finish_flush(batch, false, now).unwrap();
            assert_eq!(s.next_deadline(), Some(now + MAX_WAIT.min(s.backoff().current())));
        }
        assert_eq!(s.backoff().current(), Duration::MAX);
    }

    proptest! {
        #[test]
        fn prop_same_key_collapses_to_one_job(gaps in prop::collection::vec(0u64..1200, 1..40)) {
            let mut s = scheduler();
            let mut now = Instant::now();
            for gap in &gaps {
                now += Duration::from_millis(*gap);
                s.enqueue(job("db:cal"), now);
            }

            prop_assert_eq!(s.begin_flush(now + DEBOUNCE - Duration::from_millis(1)), None);
            let batch = s.begin_flush(now + DEBOUNCE).unwrap();
            prop_assert_eq!(batch, vec![job("db:cal")]);
        }

        #[test]
        fn prop_backoff_after_k_failures(k in 1u32..20) {
            let mut s = scheduler();
            let mut now = Instant::now();
            s.enqueue(job("db:cal"), now);

            let mut wait = Duration::ZERO;
            for _ in 0..k {
                now += Duration::from_secs(3600);
                let batch = s.begin_flush(now).unwrap();
                wait = s.finish_flush(batch, false, now).unwrap();
            }
            let expected = (1000u64 << k).min(60_000);
            prop_assert_eq!(wait, Duration::from_millis(expected));
        }
    }

    /// Records jobs; fails the first `fail_first` runs.
    #[derive(Default)]
    struct RecordingRunner {
        runs: Mutex<Vec<String>>,
        fail_first: usize,
        attempts: AtomicUsize,
    }

    impl RecordingRunner {
        fn runs(&self) -> Vec<String> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, job: &SyncJob) -> Result<()> {
            self.runs.lock().unwrap().push(job.key().to_string());
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                return Err(SyncError::Api {
                    service: Service::Google,
                    status: 503,
                    body: String::new(),
                });
            }
            Ok(())
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            debounce: DEBOUNCE,
            poll_interval: Duration::from_secs(3600),
            backoff_floor: Duration::from_millis(1000),
            backoff_cap: Duration::from_millis(60_000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_debounces_local_changes() {
        let runner = Arc::new(RecordingRunner::default());
        let handle = SchedulerHandle::spawn(config(), runner.clone());

        for _ in 0..5 {
            handle.enqueue(job("db:cal"));
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(runner.runs().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runner.runs(), ["db:cal"]);
        assert_eq!(handle.status().state, SchedulerState::Idle);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_retries_with_backoff() {
        let runner = Arc::new(RecordingRunner {
            fail_first: 2,
            ..Default::default()
        });
        let handle = SchedulerHandle::spawn(config(), runner.clone());
        handle.enqueue(job("db:cal"));

        // debounce 1.2s, then retries after 2s and 4s
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(runner.runs().len(), 1);
        assert_eq!(handle.status().state, SchedulerState::BackoffWait);
        assert_eq!(handle.status().backoff_ms, 2000);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(runner.runs().len(), 2);

        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(runner.runs().len(), 3);
        let status = handle.status();
        assert_eq!(status.state, SchedulerState::Idle);
        assert_eq!(status.consecutive_failures, 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_polls_periodically() {
        let runner = Arc::new(RecordingRunner::default());
        let handle = SchedulerHandle::spawn(
            SchedulerConfig {
                poll_interval: Duration::from_secs(60),
                ..config()
            },
            runner.clone(),
        );

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(runner.runs(), ["full-poll"]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runner.runs(), ["full-poll", "full-poll"]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_survives_huge_timings() {
        let runner = Arc::new(RecordingRunner::default());
        let handle = SchedulerHandle::spawn(
            SchedulerConfig {
                debounce: Duration::MAX,
                poll_interval: Duration::MAX,
                backoff_floor: Duration::MAX,
                backoff_cap: Duration::MAX,
            },
            runner.clone(),
        );

        handle.enqueue(job("db:cal"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(runner.runs().is_empty());
        assert_eq!(handle.status().state, SchedulerState::Debouncing);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_debounce() {
        let runner = Arc::new(RecordingRunner::default());
        let handle = SchedulerHandle::spawn(config(), runner.clone());

        handle.enqueue(job("db:cal"));
        handle.shutdown().await;
        handle.enqueue(job("db:cal"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(runner.runs().is_empty());
        assert!(handle.status().stopped);
    }
}
