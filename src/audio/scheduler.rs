use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::protocol::models::OUTPUT_SAMPLE_RATE;

/// Monotonic time source for the playback timeline. Abstracted so the
/// scheduling invariants can be tested without real time.
pub trait AudioClock: Send {
    /// Time elapsed since the clock's epoch.
    fn now(&self) -> Duration;
}

/// Production clock over [`Instant`].
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// One decoded inbound chunk with its slot on the playback timeline.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    pub samples: Vec<i16>,
    pub start: Duration,
    pub end: Duration,
    rms: f32,
}

/// Orders inbound chunks onto a gapless timeline.
///
/// Each buffer starts at `max(now, previous buffer's end)`, so buffers never
/// overlap and consecutive buffers abut exactly while the queue is ahead of
/// real time. [`PlaybackScheduler::flush`] resets the baseline so the next
/// chunk starts from "now" rather than a stale future timestamp.
pub struct PlaybackScheduler<C: AudioClock> {
    clock: C,
    sample_rate: u32,
    queue: VecDeque<PlaybackBuffer>,
    last_end: Duration,
}

impl<C: AudioClock> PlaybackScheduler<C> {
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self::with_sample_rate(clock, OUTPUT_SAMPLE_RATE)
    }

    #[must_use]
    pub fn with_sample_rate(clock: C, sample_rate: u32) -> Self {
        Self {
            clock,
            sample_rate,
            queue: VecDeque::new(),
            last_end: Duration::ZERO,
        }
    }

    /// Place decoded samples on the timeline and return their slot.
    pub fn schedule(&mut self, samples: Vec<i16>) -> &PlaybackBuffer {
        let now = self.clock.now();
        self.prune(now);

        let start = now.max(self.last_end);
        let end = start + samples_duration(samples.len(), self.sample_rate);
        let rms = rms_level(&samples);

        self.last_end = end;
        self.queue.push_back(PlaybackBuffer {
            samples,
            start,
            end,
            rms,
        });
        self.queue.back().expect("just pushed")
    }

    /// Drop everything pending and reset the baseline to "now". Takes effect
    /// before any subsequently scheduled chunk.
    pub fn flush(&mut self) {
        self.queue.clear();
        self.last_end = Duration::ZERO;
    }

    /// Buffers not yet fully played, oldest first.
    #[must_use]
    pub fn pending(&self) -> &VecDeque<PlaybackBuffer> {
        &self.queue
    }

    #[must_use]
    pub fn last_scheduled_end(&self) -> Duration {
        self.last_end
    }

    /// RMS level of whatever is sounding right now; advisory, for volume
    /// metering.
    #[must_use]
    pub fn current_level(&mut self) -> f32 {
        let now = self.clock.now();
        self.prune(now);
        self.queue
            .front()
            .filter(|buffer| buffer.start <= now)
            .map_or(0.0, |buffer| buffer.rms)
    }

    fn prune(&mut self, now: Duration) {
        while self.queue.front().is_some_and(|buffer| buffer.end <= now) {
            self.queue.pop_front();
        }
    }
}

/// Decode raw little-endian PCM16 bytes.
///
/// # Errors
/// [`Error::PlaybackDecode`] on an odd-length payload. The caller drops the
/// chunk; the scheduling clock is untouched.
#[allow(clippy::result_large_err)]
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::PlaybackDecode(format!(
            "truncated PCM16 payload ({} bytes)",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

fn samples_duration(len: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(len as f64 / f64::from(sample_rate))
}

fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = f64::from(s) / f64::from(i16::MAX);
            normalized * normalized
        })
        .sum();
    (sum / samples.len() as f64).sqrt() as f32
}
