//! Gapless playback scheduling. Segments arrive in message order and play
//! back-to-back against the output clock; an interruption stops everything
//! at once.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::types::audio::PlaybackSegment;

pub mod bus;

pub use bus::RingBufferBus;

/// Handle for one scheduled source on the output bus.
pub type SourceId = u64;

/// The output side of the audio pipeline: a clock plus start/stop control
/// over individual sources. Injectable so tests can drive time by hand.
pub trait OutputBus: Send {
    /// Current position of the output clock, in seconds.
    fn now(&self) -> f64;

    /// Begins playing `segment` at clock time `at` and returns its handle.
    fn start(&mut self, segment: PlaybackSegment, at: f64) -> SourceId;

    /// Stops a source immediately, however much of it has played.
    fn stop(&mut self, id: SourceId);
}

struct SchedulerInner<B> {
    bus: B,
    next_start_time: f64,
    active: HashSet<SourceId>,
}

/// Owns the playback clock and the set of active sources. One mutex guards
/// bus, clock and set together, so a flush racing an enqueue either stops
/// the freshly scheduled segment or runs before it is scheduled at all.
pub struct PlaybackScheduler<B: OutputBus> {
    inner: Mutex<SchedulerInner<B>>,
}

impl<B: OutputBus> PlaybackScheduler<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Mutex::new(SchedulerInner {
                bus,
                next_start_time: 0.0,
                active: HashSet::new(),
            }),
        }
    }

    /// Schedules a segment directly after whatever is already queued, or
    /// immediately if the queue has drained. Strict arrival order; nothing
    /// reorders by timestamps in the data.
    pub fn enqueue(&self, segment: PlaybackSegment) {
        let Ok(mut inner) = self.inner.lock() else {
            tracing::error!("playback scheduler lock poisoned; dropping segment");
            return;
        };
        let start = inner.next_start_time.max(inner.bus.now());
        let duration = segment.duration_secs();
        let id = inner.bus.start(segment, start);
        inner.active.insert(id);
        inner.next_start_time = start + duration;
    }

    /// The interruption response: the user spoke over a reply, so every
    /// queued or playing segment stops now and the clock rewinds to zero.
    pub fn flush_and_reset(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            tracing::error!("playback scheduler lock poisoned; cannot flush");
            return;
        };
        let stopped: Vec<SourceId> = inner.active.drain().collect();
        for id in stopped {
            inner.bus.stop(id);
        }
        inner.next_start_time = 0.0;
    }

    /// Called when a source finishes playing naturally.
    pub fn handle_ended(&self, id: SourceId) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.active.remove(&id);
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.active.len()).unwrap_or(0)
    }

    pub fn next_start_time(&self) -> f64 {
        self.inner
            .lock()
            .map(|inner| inner.next_start_time)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct BusState {
        now: f64,
        next_id: SourceId,
        started: Vec<(SourceId, f64, f64)>, // id, start time, duration
        stopped: Vec<SourceId>,
    }

    #[derive(Clone, Default)]
    struct FakeBus {
        state: Arc<Mutex<BusState>>,
    }

    impl FakeBus {
        fn set_now(&self, now: f64) {
            self.state.lock().unwrap().now = now;
        }

        fn started(&self) -> Vec<(SourceId, f64, f64)> {
            self.state.lock().unwrap().started.clone()
        }

        fn stopped(&self) -> Vec<SourceId> {
            self.state.lock().unwrap().stopped.clone()
        }
    }

    impl OutputBus for FakeBus {
        fn now(&self) -> f64 {
            self.state.lock().unwrap().now
        }

        fn start(&mut self, segment: PlaybackSegment, at: f64) -> SourceId {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.started.push((id, at, segment.duration_secs()));
            id
        }

        fn stop(&mut self, id: SourceId) {
            self.state.lock().unwrap().stopped.push(id);
        }
    }

    fn segment(seconds: f64) -> PlaybackSegment {
        let samples = (seconds * 24_000.0).round() as usize;
        PlaybackSegment::new(vec![vec![0.0; samples]], 24_000)
    }

    #[test]
    fn segments_play_back_to_back_without_overlap() {
        let bus = FakeBus::default();
        let scheduler = PlaybackScheduler::new(bus.clone());

        scheduler.enqueue(segment(0.5));
        scheduler.enqueue(segment(0.25));
        scheduler.enqueue(segment(1.0));

        let started = bus.started();
        assert_eq!(started.len(), 3);
        for pair in started.windows(2) {
            let (_, prev_start, prev_duration) = pair[0];
            let (_, next_start, _) = pair[1];
            assert!(next_start >= prev_start + prev_duration);
        }
        assert_eq!(started[1].1, 0.5);
        assert_eq!(started[2].1, 0.75);
        assert_eq!(scheduler.next_start_time(), 1.75);
    }

    #[test]
    fn enqueue_never_schedules_into_the_past() {
        let bus = FakeBus::default();
        let scheduler = PlaybackScheduler::new(bus.clone());

        bus.set_now(3.0);
        scheduler.enqueue(segment(0.5));
        assert_eq!(bus.started()[0].1, 3.0);
        assert_eq!(scheduler.next_start_time(), 3.5);
    }

    #[test]
    fn flush_stops_everything_and_rewinds_the_clock() {
        let bus = FakeBus::default();
        let scheduler = PlaybackScheduler::new(bus.clone());

        scheduler.enqueue(segment(0.5));
        scheduler.enqueue(segment(0.5));
        assert_eq!(scheduler.active_count(), 2);

        bus.set_now(0.2);
        scheduler.flush_and_reset();

        assert_eq!(scheduler.active_count(), 0);
        assert!(scheduler.next_start_time() <= bus.now());
        let mut stopped = bus.stopped();
        stopped.sort_unstable();
        assert_eq!(stopped, vec![0, 1]);

        // The next reply starts immediately at the current clock.
        scheduler.enqueue(segment(0.5));
        assert_eq!(bus.started()[2].1, 0.2);
    }

    #[test]
    fn natural_completion_retires_the_source() {
        let bus = FakeBus::default();
        let scheduler = PlaybackScheduler::new(bus.clone());

        scheduler.enqueue(segment(0.5));
        let id = bus.started()[0].0;
        scheduler.handle_ended(id);

        assert_eq!(scheduler.active_count(), 0);
        // A later flush must not stop an already-finished source.
        scheduler.flush_and_reset();
        assert!(bus.stopped().is_empty());
    }

    #[test]
    fn flush_under_contention_leaves_no_survivors() {
        let bus = FakeBus::default();
        let scheduler = Arc::new(PlaybackScheduler::new(bus.clone()));

        let enqueuers: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        scheduler.enqueue(segment(0.01));
                    }
                })
            })
            .collect();
        for handle in enqueuers {
            handle.join().unwrap();
        }
        scheduler.flush_and_reset();

        assert_eq!(scheduler.active_count(), 0);
        let started: HashSet<SourceId> = bus.started().iter().map(|s| s.0).collect();
        let stopped: HashSet<SourceId> = bus.stopped().into_iter().collect();
        assert_eq!(started, stopped);
        assert_eq!(scheduler.next_start_time(), 0.0);
    }
}
