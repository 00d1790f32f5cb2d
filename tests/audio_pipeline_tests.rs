//! Scheduling and chunking properties exercised through the public API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use gemini_live_rs::audio::scheduler::{AudioClock, PlaybackScheduler, decode_pcm16};
use gemini_live_rs::audio::{CHUNK_SAMPLES, CaptureChunker};

#[derive(Clone)]
struct TestClock(Arc<AtomicU64>);

impl TestClock {
    fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    fn advance(&self, d: Duration) {
        self.0
            .fetch_add(u64::try_from(d.as_micros()).unwrap(), Ordering::SeqCst);
    }
}

impl AudioClock for TestClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.0.load(Ordering::SeqCst))
    }
}

/// 24 kHz chunks of varying size scheduled with jittered arrival times never
/// overlap, and stay back-to-back while the queue is ahead of real time.
#[test]
fn arbitrary_add_sequences_never_overlap() {
    let clock = TestClock::new();
    let mut scheduler = PlaybackScheduler::new(clock.clone());

    let sizes = [240, 480, 960, 120, 2400, 480];
    let jitter_us = [0u64, 700, 150, 4000, 90, 2500];
    for (size, jitter) in sizes.iter().zip(jitter_us) {
        clock.advance(Duration::from_micros(jitter));
        scheduler.schedule(vec![0i16; *size]);
    }

    let pending: Vec<_> = scheduler.pending().iter().cloned().collect();
    for window in pending.windows(2) {
        assert!(
            window[0].end <= window[1].start,
            "scheduled intervals overlap"
        );
        assert_eq!(
            window[0].end, window[1].start,
            "gap between consecutive intervals"
        );
    }
}

/// Flushing mid-stream guarantees the next chunk starts at "now", not at the
/// previously computed future timestamp.
#[test]
fn flush_then_add_starts_at_now() {
    let clock = TestClock::new();
    let mut scheduler = PlaybackScheduler::new(clock.clone());

    for _ in 0..20 {
        scheduler.schedule(vec![0i16; 2400]); // 100 ms each
    }
    assert_eq!(scheduler.last_scheduled_end(), Duration::from_secs(2));

    clock.advance(Duration::from_millis(130));
    scheduler.flush();
    assert_eq!(scheduler.pending().len(), 0);

    clock.advance(Duration::from_millis(1));
    let buffer = scheduler.schedule(vec![0i16; 2400]);
    assert_eq!(buffer.start, Duration::from_millis(131));
}

#[test]
fn malformed_pcm_leaves_clock_untouched() {
    let clock = TestClock::new();
    let mut scheduler = PlaybackScheduler::new(clock.clone());

    scheduler.schedule(vec![0i16; 2400]);
    let end_before = scheduler.last_scheduled_end();

    // A truncated payload is rejected before it ever reaches the scheduler.
    assert!(decode_pcm16(&[1, 2, 3]).is_err());
    assert_eq!(scheduler.last_scheduled_end(), end_before);

    let samples = decode_pcm16(&[1, 0, 2, 0]).unwrap();
    let buffer = scheduler.schedule(samples);
    assert_eq!(buffer.start, end_before);
}

/// Chunks produced while the tool-use flag is set carry the interrupt hint;
/// the tag is decided at production time, not at capture time.
#[test]
fn capture_chunks_tagged_only_while_tool_in_use() {
    let using_tool = Arc::new(AtomicBool::new(false));
    let mut chunker = CaptureChunker::new(Arc::clone(&using_tool));

    let mut tagged = Vec::new();
    for round in 0..6 {
        using_tool.store(round % 2 == 1, Ordering::Release);
        for chunk in chunker.push(&vec![0i16; CHUNK_SAMPLES]) {
            tagged.push(chunk.interrupt == Some(true));
        }
    }

    assert_eq!(tagged, vec![false, true, false, true, false, true]);
}
