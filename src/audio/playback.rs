// Gapless sequencing of agent speech audio.
//
// The scheduler owns the ordering invariant: the next scheduled start time
// never decreases and never falls behind the sink's clock. The sink owns
// the device; the scheduler only talks to it through the trait.

use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::encode::samples_from_pcm;
use super::AudioError;

/// Identifies one scheduled playback source for cancellation and
/// finished-notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// Events emitted by a playback sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A scheduled source played to its natural end.
    Finished(SourceId),
}

/// Audio output trait.
///
/// `current_time` is a monotonic clock in seconds, starting at zero when
/// the sink opens. Scheduled sources that finish naturally are reported on
/// the receiver returned by `open`; cancelled sources are not.
#[async_trait::async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Open the output device.
    ///
    /// Returns a channel receiver that will receive playback events.
    async fn open(&mut self) -> Result<mpsc::Receiver<PlaybackEvent>, AudioError>;

    /// Monotonic playback clock in seconds.
    fn current_time(&self) -> f64;

    /// Schedule `samples` to begin playing at `start_at` seconds.
    fn schedule(
        &mut self,
        id: SourceId,
        samples: Vec<i16>,
        start_at: f64,
    ) -> Result<(), AudioError>;

    /// Stop a scheduled source immediately. Unknown ids are a no-op.
    fn cancel(&mut self, id: SourceId) -> Result<(), AudioError>;

    /// Close the output device. Safe to call when already closed.
    async fn close(&mut self) -> Result<(), AudioError>;

    /// Sink name for logging.
    fn name(&self) -> &str;
}

/// Decodes agent audio chunks and schedules them back-to-back on a sink.
pub struct PlaybackScheduler {
    sample_rate: u32,
    next_start_time: f64,
    active: HashSet<SourceId>,
    next_source: u64,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            next_start_time: 0.0,
            active: HashSet::new(),
            next_source: 0,
        }
    }

    /// Decode one 16-bit LE PCM chunk and schedule it for gapless playback.
    ///
    /// Returns the new source's id, or `None` for an empty chunk.
    pub fn enqueue(
        &mut self,
        sink: &mut dyn PlaybackSink,
        pcm: &[u8],
    ) -> Result<Option<SourceId>, AudioError> {
        if pcm.len() % 2 != 0 {
            warn!("Audio chunk has odd byte length {}; dropping trailing byte", pcm.len());
        }

        let samples = samples_from_pcm(pcm);
        if samples.is_empty() {
            debug!("Skipping empty audio chunk");
            return Ok(None);
        }

        let duration = samples.len() as f64 / self.sample_rate as f64;
        let start_at = self.next_start_time.max(sink.current_time());

        let id = SourceId(self.next_source);
        self.next_source += 1;

        sink.schedule(id, samples, start_at)?;
        self.active.insert(id);
        self.next_start_time = start_at + duration;

        debug!(
            "Scheduled source {:?} at {:.3}s for {:.3}s ({} active)",
            id,
            start_at,
            duration,
            self.active.len()
        );

        Ok(Some(id))
    }

    /// Record that a source played to its end.
    ///
    /// Returns true when this drained the active set — the signal for the
    /// controller to revert speaking → listening.
    pub fn on_finished(&mut self, id: SourceId) -> bool {
        self.active.remove(&id) && self.active.is_empty()
    }

    /// Barge-in: stop everything queued and restart the schedule at "now".
    ///
    /// The next enqueued chunk starts relative to the sink's current time
    /// rather than a stale future offset.
    pub fn interrupt(&mut self, sink: &mut dyn PlaybackSink) {
        for id in self.active.drain() {
            if let Err(e) = sink.cancel(id) {
                warn!("Failed to cancel source {:?}: {}", id, e);
            }
        }
        self.next_start_time = 0.0;
    }

    /// Forget all schedule state without touching the sink.
    ///
    /// Used when a fresh run begins; the previous run's teardown already
    /// cancelled its sources.
    pub fn reset(&mut self) {
        self.active.clear();
        self.next_start_time = 0.0;
    }

    pub fn is_active(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records schedule/cancel calls and exposes a settable clock.
    struct MockSink {
        now: f64,
        scheduled: Vec<(SourceId, usize, f64)>,
        cancelled: Vec<SourceId>,
    }

    impl MockSink {
        fn new() -> Self {
            Self {
                now: 0.0,
                scheduled: Vec::new(),
                cancelled: Vec::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl PlaybackSink for MockSink {
        async fn open(&mut self) -> Result<mpsc::Receiver<PlaybackEvent>, AudioError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        fn current_time(&self) -> f64 {
            self.now
        }

        fn schedule(
            &mut self,
            id: SourceId,
            samples: Vec<i16>,
            start_at: f64,
        ) -> Result<(), AudioError> {
            self.scheduled.push((id, samples.len(), start_at));
            Ok(())
        }

        fn cancel(&mut self, id: SourceId) -> Result<(), AudioError> {
            self.cancelled.push(id);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), AudioError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    /// PCM bytes for `n` zero samples.
    fn pcm(n: usize) -> Vec<u8> {
        vec![0u8; n * 2]
    }

    #[test]
    fn test_back_to_back_chunks_schedule_gapless() {
        // 3 chunks arriving instantly must be laid out end to end.
        let mut sink = MockSink::new();
        let mut scheduler = PlaybackScheduler::new(1000);

        scheduler.enqueue(&mut sink, &pcm(500)).unwrap(); // 0.5s
        scheduler.enqueue(&mut sink, &pcm(250)).unwrap(); // 0.25s
        scheduler.enqueue(&mut sink, &pcm(100)).unwrap(); // 0.1s

        let starts: Vec<f64> = sink.scheduled.iter().map(|s| s.2).collect();
        assert_eq!(starts, vec![0.0, 0.5, 0.75]);
    }

    #[test]
    fn test_slow_arrivals_start_at_now() {
        // A chunk arriving after the previous one finished starts at the
        // clock, not at the stale end of the last chunk.
        let mut sink = MockSink::new();
        let mut scheduler = PlaybackScheduler::new(1000);

        scheduler.enqueue(&mut sink, &pcm(100)).unwrap(); // ends at 0.1
        sink.now = 0.5;
        scheduler.enqueue(&mut sink, &pcm(100)).unwrap();

        assert_eq!(sink.scheduled[1].2, 0.5);
    }

    #[test]
    fn test_start_times_never_decrease() {
        let mut sink = MockSink::new();
        let mut scheduler = PlaybackScheduler::new(1000);

        scheduler.enqueue(&mut sink, &pcm(300)).unwrap();
        sink.now = 0.1; // still inside chunk 1
        scheduler.enqueue(&mut sink, &pcm(300)).unwrap();
        sink.now = 0.2;
        scheduler.enqueue(&mut sink, &pcm(300)).unwrap();

        let starts: Vec<f64> = sink.scheduled.iter().map(|s| s.2).collect();
        assert_eq!(starts, vec![0.0, 0.3, 0.6]);
    }

    #[test]
    fn test_interrupt_cancels_and_resets() {
        let mut sink = MockSink::new();
        let mut scheduler = PlaybackScheduler::new(1000);

        scheduler.enqueue(&mut sink, &pcm(1000)).unwrap();
        scheduler.enqueue(&mut sink, &pcm(1000)).unwrap();
        assert_eq!(scheduler.active_count(), 2);

        sink.now = 0.4;
        scheduler.interrupt(&mut sink);

        assert_eq!(sink.cancelled.len(), 2);
        assert!(!scheduler.is_active());

        // The next chunk starts at "now", not at the pre-interrupt offset
        // of 2.0s.
        scheduler.enqueue(&mut sink, &pcm(100)).unwrap();
        assert_eq!(sink.scheduled[2].2, 0.4);
    }

    #[test]
    fn test_on_finished_signals_only_when_drained() {
        let mut sink = MockSink::new();
        let mut scheduler = PlaybackScheduler::new(1000);

        let a = scheduler.enqueue(&mut sink, &pcm(10)).unwrap().unwrap();
        let b = scheduler.enqueue(&mut sink, &pcm(10)).unwrap().unwrap();

        assert!(!scheduler.on_finished(a));
        assert!(scheduler.on_finished(b));
        // A stale finished event for an already-removed source must not
        // re-signal.
        assert!(!scheduler.on_finished(a));
    }

    #[test]
    fn test_empty_chunk_is_skipped() {
        let mut sink = MockSink::new();
        let mut scheduler = PlaybackScheduler::new(1000);

        let id = scheduler.enqueue(&mut sink, &[]).unwrap();
        assert!(id.is_none());
        assert!(sink.scheduled.is_empty());
        assert!(!scheduler.is_active());
    }
}
