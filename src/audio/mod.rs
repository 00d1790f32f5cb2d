//! Microphone capture and speaker playback pipelines.
//!
//! Both pipelines confine their `!Send` device resources (`cpal::Stream`,
//! `rodio::OutputStream`) to dedicated OS threads and expose `Send + Sync`
//! handles. The pure pieces (chunk assembly and playback scheduling) live in
//! [`chunker`] and [`scheduler`] where they are testable without hardware.

pub mod capture;
pub mod chunker;
pub mod playback;
pub mod scheduler;

pub use capture::AudioCapture;
pub use chunker::{CHUNK_SAMPLES, CaptureChunker};
pub use playback::AudioPlayback;
pub use scheduler::{AudioClock, MonotonicClock, PlaybackBuffer, PlaybackScheduler, decode_pcm16};
