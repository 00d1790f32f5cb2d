use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::protocol::models::MediaChunk;

/// Samples of audio per outbound chunk: 40 ms at 16 kHz. Short enough to keep
/// end-to-end latency low, long enough to amortize per-chunk overhead.
pub const CHUNK_SAMPLES: usize = 640;

/// Assembles captured PCM16 samples into fixed-size [`MediaChunk`]s.
///
/// Chunks come out in capture order, each tagged with the interrupt hint iff
/// the tool-use flag is set at the moment the chunk is produced. While the
/// model is executing a tool call the service suppresses its own
/// interruption handling, so the client flags new audio as preempting the
/// stale turn instead.
pub struct CaptureChunker {
    pending: Vec<i16>,
    using_tool: Arc<AtomicBool>,
}

impl CaptureChunker {
    #[must_use]
    pub fn new(using_tool: Arc<AtomicBool>) -> Self {
        Self {
            pending: Vec::with_capacity(CHUNK_SAMPLES),
            using_tool,
        }
    }

    /// Feed captured samples; returns every chunk completed by this batch,
    /// in order.
    pub fn push(&mut self, samples: &[i16]) -> Vec<MediaChunk> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / CHUNK_SAMPLES;
        let mut chunks = Vec::with_capacity(complete);
        for _ in 0..complete {
            let rest = self.pending.split_off(CHUNK_SAMPLES);
            let full = std::mem::replace(&mut self.pending, rest);
            chunks.push(self.finish(&full));
        }
        chunks
    }

    /// Emit whatever remains as a final short chunk. Called on stop so no
    /// captured audio is dropped silently.
    pub fn flush(&mut self) -> Option<MediaChunk> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(self.finish(&rest))
    }

    fn finish(&self, samples: &[i16]) -> MediaChunk {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        let chunk = MediaChunk::audio(&bytes);
        if self.using_tool.load(Ordering::Acquire) {
            chunk.with_interrupt()
        } else {
            chunk
        }
    }
}

/// Fold interleaved multi-channel audio at any rate down to mono 16 kHz.
/// Nearest-sample resampling; good enough for speech input.
#[must_use]
pub fn to_mono_16k(samples: &[f32], channels: usize, from_rate: u32) -> Vec<i16> {
    if channels == 0 || samples.is_empty() {
        return Vec::new();
    }

    let mono: Vec<f32> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    let target_rate = crate::protocol::models::INPUT_SAMPLE_RATE;
    let resampled: Vec<f32> = if from_rate == target_rate {
        mono
    } else {
        let out_len = (mono.len() as u64 * u64::from(target_rate) / u64::from(from_rate)) as usize;
        let mut out = Vec::with_capacity(out_len);
        for i in 0..out_len {
            let src = (i as u64 * u64::from(from_rate) / u64::from(target_rate)) as usize;
            if src >= mono.len() {
                break;
            }
            out.push(mono[src]);
        }
        out
    };

    resampled
        .into_iter()
        .map(|sample| {
            let clamped = sample.clamp(-1.0, 1.0);
            (clamped * f32::from(i16::MAX)) as i16
        })
        .collect()
}
