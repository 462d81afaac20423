//! Per-destination batching of outgoing payloads, flushed on a fixed tick.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use dashmap::DashMap;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, trace};

/// Callback receiving one drained batch for a destination.
pub type EmitFn<T> = Arc<dyn Fn(&str, Vec<T>) + Send + Sync>;

/// Payload waiting in a queue, stamped with the instant its change was observed.
struct Queued<T> {
    payload: T,
    since: Instant,
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Destinations that received a batch.
    pub batches: usize,
    /// Payloads emitted across every batch.
    pub payloads: usize,
    /// Longest time a payload waited between its change and the emit.
    pub max_latency: Duration,
}

/// Accumulates payloads per destination (room or socket id) and emits one
/// message per non-empty destination on every tick.
pub struct BatchFanout<T> {
    name: &'static str,
    interval: Duration,
    queues: DashMap<String, Vec<Queued<T>>>,
    emit: EmitFn<T>,
}

impl<T: Send + Sync + 'static> BatchFanout<T> {
    /// Build a fanout named `name` (used in logs) flushing every `interval` through `emit`.
    pub fn new(name: &'static str, interval: Duration, emit: EmitFn<T>) -> Self {
        Self {
            name,
            interval,
            queues: DashMap::new(),
            emit,
        }
    }

    /// Append `payload` to the queue of `destination`.
    pub fn push(&self, destination: &str, payload: T) {
        self.push_since(destination, payload, Instant::now());
    }

    /// Append `payload`, measuring its latency from `since` rather than from now.
    pub fn push_since(&self, destination: &str, payload: T, since: Instant) {
        self.queues
            .entry(destination.to_string())
            .or_default()
            .push(Queued { payload, since });
    }

    /// Drain every queue and emit the batches.
    ///
    /// Each queue is swapped out by removing its entry, so a payload pushed
    /// while the flush runs lands in a fresh queue picked up by the next tick.
    pub fn flush(&self) -> FlushReport {
        let destinations: Vec<String> = self.queues.iter().map(|entry| entry.key().clone()).collect();

        let mut report = FlushReport::default();
        for destination in destinations {
            let Some((destination, queued)) = self.queues.remove(&destination) else {
                continue;
            };
            let Some(oldest) = queued.iter().map(|entry| entry.since).min() else {
                continue;
            };
            let latency = oldest.elapsed();
            let batch: Vec<T> = queued.into_iter().map(|entry| entry.payload).collect();
            trace!(
                fanout = self.name,
                %destination,
                size = batch.len(),
                latency_ms = latency.as_secs_f64() * 1000.0,
                "flushing batch"
            );
            report.batches += 1;
            report.payloads += batch.len();
            report.max_latency = report.max_latency.max(latency);
            (self.emit)(&destination, batch);
        }
        report
    }

    /// Discard the pending queue of a destination that no longer exists.
    pub fn remove(&self, destination: &str) -> usize {
        self.queues
            .remove(destination)
            .map(|(_, queued)| queued.len())
            .unwrap_or(0)
    }

    /// Number of payloads waiting for `destination`.
    pub fn pending(&self, destination: &str) -> usize {
        self.queues.get(destination).map(|queue| queue.len()).unwrap_or(0)
    }

    /// Spawn the flush loop. The task ends once the fanout is dropped.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.interval;
        let name = self.name;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(fanout) = weak.upgrade() else {
                    break;
                };
                let report = fanout.flush();
                if report.max_latency > period * 2 {
                    debug!(
                        fanout = name,
                        batches = report.batches,
                        payloads = report.payloads,
                        latency_ms = report.max_latency.as_secs_f64() * 1000.0,
                        "fanout running behind"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    type Sink = Arc<Mutex<Vec<(String, Vec<u32>)>>>;

    fn recording_fanout(interval: Duration) -> (Arc<BatchFanout<u32>>, Sink) {
        let sink: Sink = Arc::default();
        let recorder = sink.clone();
        let fanout = BatchFanout::new(
            "test",
            interval,
            Arc::new(move |destination: &str, batch: Vec<u32>| {
                recorder.lock().unwrap().push((destination.to_string(), batch));
            }),
        );
        (Arc::new(fanout), sink)
    }

    #[test]
    fn batches_keep_push_order_per_destination() {
        let (fanout, sink) = recording_fanout(Duration::from_millis(100));
        fanout.push("room-a", 1);
        fanout.push("room-b", 10);
        fanout.push("room-a", 2);
        fanout.push("room-a", 3);

        assert_eq!(fanout.flush().batches, 2);

        let mut batches = sink.lock().unwrap().clone();
        batches.sort();
        assert_eq!(
            batches,
            vec![
                ("room-a".to_string(), vec![1, 2, 3]),
                ("room-b".to_string(), vec![10]),
            ]
        );
    }

    #[test]
    fn every_payload_is_delivered_exactly_once() {
        let (fanout, sink) = recording_fanout(Duration::from_millis(100));
        let mut expected = Vec::new();
        for round in 0..5u32 {
            for n in 0..round {
                let payload = round * 100 + n;
                fanout.push("room", payload);
                expected.push(payload);
            }
            fanout.flush();
        }
        assert_eq!(fanout.flush(), FlushReport::default(), "queues are empty after a flush");

        let delivered: Vec<u32> = sink
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, batch)| batch.clone())
            .collect();
        assert_eq!(delivered, expected);
    }

    #[test]
    fn removed_destination_is_not_flushed() {
        let (fanout, sink) = recording_fanout(Duration::from_millis(100));
        fanout.push("room", 1);
        fanout.push("room", 2);
        assert_eq!(fanout.pending("room"), 2);

        assert_eq!(fanout.remove("room"), 2);
        assert_eq!(fanout.flush().batches, 0);
        assert!(sink.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_flushes_on_tick() {
        let (fanout, sink) = recording_fanout(Duration::from_millis(50));
        let handle = fanout.spawn();
        tokio::time::sleep(Duration::from_millis(1)).await;

        fanout.push("room", 7);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.lock().unwrap().clone(), vec![("room".to_string(), vec![7])]);

        drop(fanout);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_reports_latency_since_the_change() {
        let (fanout, _sink) = recording_fanout(Duration::from_millis(100));
        let observed = Instant::now();
        tokio::time::advance(Duration::from_millis(30)).await;
        fanout.push_since("room", 1, observed);
        fanout.push("room", 2);
        fanout.push("other", 3);
        tokio::time::advance(Duration::from_millis(10)).await;

        let report = fanout.flush();
        assert_eq!(report.batches, 2);
        assert_eq!(report.payloads, 3);
        assert_eq!(report.max_latency, Duration::from_millis(40));
    }
}
