use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::request::StatKind;
use crate::response::Response;

/// Process-wide record of how long each successful computation took.
///
/// Appends and reads go through one lock, so every reader sees a consistent prefix of
/// the recorded sequence and no append is ever lost.
#[derive(Debug, Default)]
pub struct StatsStore {
    times: RwLock<Vec<Duration>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub requests: usize,
    pub average: Duration,
    pub max: Duration,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, elapsed: Duration) {
        let mut times = self.times.write().unwrap_or_else(PoisonError::into_inner);
        times.push(elapsed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let times = self.times.read().unwrap_or_else(PoisonError::into_inner);
        let total: Duration = times.iter().sum();
        let average = match u32::try_from(times.len()) {
            Ok(0) => Duration::ZERO,
            Ok(count) => total / count,
            Err(_) => Duration::from_secs_f64(total.as_secs_f64() / times.len() as f64),
        };
        StatsSnapshot {
            requests: times.len(),
            average,
            max: times.iter().max().copied().unwrap_or_default(),
        }
    }

    pub fn requests(&self) -> usize {
        self.snapshot().requests
    }

    /// Builds the reply for a stat request; `elapsed` is the time spent serving it.
    pub fn respond(&self, kind: StatKind, elapsed: Duration) -> Response {
        let snapshot = self.snapshot();
        match kind {
            StatKind::Reqs => Response::integer(elapsed, snapshot.requests as u64),
            StatKind::AvgTime => Response::decimal(elapsed, snapshot.average.as_secs_f64()),
            StatKind::MaxTime => Response::decimal(elapsed, snapshot.max.as_secs_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn empty_store_reports_zeroes() {
        let store = StatsStore::new();
        assert_eq!(
            store.respond(StatKind::Reqs, Duration::ZERO).to_string(),
            "OK;0.000;0"
        );
        assert_eq!(
            store.respond(StatKind::AvgTime, Duration::ZERO).to_string(),
            "OK;0.000;0.000000"
        );
        assert_eq!(
            store.respond(StatKind::MaxTime, Duration::ZERO).to_string(),
            "OK;0.000;0.000000"
        );
    }

    #[test]
    fn average_and_max() {
        let store = StatsStore::new();
        store.record(Duration::from_millis(100));
        store.record(Duration::from_millis(300));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.average, Duration::from_millis(200));
        assert_eq!(snapshot.max, Duration::from_millis(300));
        assert_eq!(
            store.respond(StatKind::AvgTime, Duration::ZERO).to_string(),
            "OK;0.000;0.200000"
        );
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let store = Arc::new(StatsStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.record(Duration::from_micros(5));
                        let _ = store.snapshot();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.requests(), 8000);
    }
}
