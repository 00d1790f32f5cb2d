use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};

use crate::error::{Error, Result};
use crate::protocol::models::MediaChunk;

use super::chunker::{CaptureChunker, to_mono_16k};

/// Capacity of the sample queue between the device callback and the
/// forwarder thread. At 40 ms per batch this is roughly a second of audio;
/// when the consumer falls behind the device callback blocks rather than
/// dropping samples (bounded-blocking, never silent loss).
const SAMPLE_QUEUE_BATCHES: usize = 32;

/// Microphone capture pipeline: device stream in, [`MediaChunk`]s out.
///
/// `cpal::Stream` is `!Send` on some platforms, so the stream lives on a
/// dedicated OS thread for its entire lifetime; a second forwarder thread
/// assembles chunks and runs the caller's callback so the device callback
/// stays cheap.
pub struct AudioCapture {
    using_tool: Arc<AtomicBool>,
    device_name: Option<String>,
    inner: Option<CaptureInner>,
}

struct CaptureInner {
    stop_tx: mpsc::Sender<()>,
    stream_thread: thread::JoinHandle<()>,
    forwarder: thread::JoinHandle<()>,
}

impl AudioCapture {
    /// `using_tool` is the session's tool-use flag; chunks produced while it
    /// is set carry the interrupt hint.
    #[must_use]
    pub fn new(using_tool: Arc<AtomicBool>) -> Self {
        Self {
            using_tool,
            device_name: None,
            inner: None,
        }
    }

    /// Capture from a named input device instead of the default one.
    #[must_use]
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.is_some()
    }

    /// Acquire the input device and start producing chunks. Each chunk is
    /// handed to `on_chunk` exactly once, in capture order, from the
    /// forwarder thread.
    ///
    /// # Errors
    /// [`Error::CaptureUnavailable`] if the device cannot be acquired or the
    /// stream cannot be built; the pipeline stays restartable afterwards.
    pub fn start<F>(&mut self, on_chunk: F) -> Result<()>
    where
        F: FnMut(MediaChunk) + Send + 'static,
    {
        if self.inner.is_some() {
            return Ok(());
        }

        let (sample_tx, sample_rx) = mpsc::sync_channel::<Vec<i16>>(SAMPLE_QUEUE_BATCHES);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (init_tx, init_rx) = mpsc::channel::<Result<()>>();

        let device_name = self.device_name.clone();
        let stream_thread = thread::Builder::new()
            .name("live-capture".into())
            .spawn(move || run_stream(device_name, &sample_tx, &stop_rx, &init_tx))
            .map_err(|e| Error::CaptureUnavailable(format!("failed to spawn capture thread: {e}")))?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                // The stream never opened; reap the thread so a retry starts
                // clean.
                let _ = stream_thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = stream_thread.join();
                return Err(Error::CaptureUnavailable(
                    "capture thread died during setup".to_string(),
                ));
            }
        }

        let chunker_flag = Arc::clone(&self.using_tool);
        let forwarder = match thread::Builder::new()
            .name("live-capture-fwd".into())
            .spawn(move || run_forwarder(&sample_rx, chunker_flag, on_chunk))
        {
            Ok(handle) => handle,
            Err(e) => {
                // Release the device before reporting failure.
                let _ = stop_tx.send(());
                let _ = stream_thread.join();
                return Err(Error::CaptureUnavailable(format!(
                    "failed to spawn forwarder: {e}"
                )));
            }
        };

        self.inner = Some(CaptureInner {
            stop_tx,
            stream_thread,
            forwarder,
        });
        Ok(())
    }

    /// Release the device and cease producing chunks. Safe to call in any
    /// state, including after a failed `start`.
    pub fn stop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let _ = inner.stop_tx.send(());
        let _ = inner.stream_thread.join();
        // The stream thread drops its sample sender on exit, which ends the
        // forwarder after it flushes the partial chunk.
        let _ = inner.forwarder.join();
        tracing::info!("Microphone capture stopped");
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the stream thread. Owns the cpal stream; exits (releasing the
/// device) on stop, on callback channel loss, and on every setup error path.
fn run_stream(
    device_name: Option<String>,
    sample_tx: &mpsc::SyncSender<Vec<i16>>,
    stop_rx: &mpsc::Receiver<()>,
    init_tx: &mpsc::Sender<Result<()>>,
) {
    let stream = match build_input_stream(device_name.as_deref(), sample_tx.clone()) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = init_tx.send(Err(err));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = init_tx.send(Err(Error::CaptureUnavailable(err.to_string())));
        return;
    }
    let _ = init_tx.send(Ok(()));

    // Park until stopped; the stream keeps capturing on its own thread.
    let _ = stop_rx.recv();
    drop(stream);
}

fn run_forwarder<F>(
    sample_rx: &mpsc::Receiver<Vec<i16>>,
    using_tool: Arc<AtomicBool>,
    mut on_chunk: F,
) where
    F: FnMut(MediaChunk) + Send + 'static,
{
    let mut chunker = CaptureChunker::new(using_tool);
    while let Ok(samples) = sample_rx.recv() {
        for chunk in chunker.push(&samples) {
            on_chunk(chunk);
        }
    }
    if let Some(partial) = chunker.flush() {
        on_chunk(partial);
    }
}

fn build_input_stream(
    device_name: Option<&str>,
    sample_tx: mpsc::SyncSender<Vec<i16>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::CaptureUnavailable(format!("no input device named {name:?}")))?,
        None => host
            .default_input_device()
            .ok_or_else(|| Error::CaptureUnavailable("no default input device".to_string()))?,
    };

    let config = device
        .default_input_config()
        .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let stream_config: StreamConfig = config.clone().into();

    tracing::info!(
        "Capturing from {:?} ({} ch @ {} Hz)",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        channels,
        sample_rate
    );

    let err_fn = |err| tracing::warn!("capture stream error: {err}");

    let stream = match config.sample_format() {
        SampleFormat::F32 => device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = to_mono_16k(data, channels, sample_rate);
                    let _ = sample_tx.send(mono);
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?,
        SampleFormat::I16 => device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let as_f32: Vec<f32> = data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                    let mono = to_mono_16k(&as_f32, channels, sample_rate);
                    let _ = sample_tx.send(mono);
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?,
        other => {
            return Err(Error::CaptureUnavailable(format!(
                "unsupported sample format {other:?}"
            )));
        }
    };

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_without_start_is_a_no_op() {
        let mut capture = AudioCapture::new(Arc::new(AtomicBool::new(false)));
        capture.stop();
        capture.stop();
        assert!(!capture.is_running());
    }

    #[test]
    fn start_failure_leaves_pipeline_restartable() {
        let mut capture =
            AudioCapture::new(Arc::new(AtomicBool::new(false))).with_device("no such device");
        let err = capture.start(|_| {}).unwrap_err();
        assert!(matches!(err, Error::CaptureUnavailable(_)));
        assert!(!capture.is_running());
        // A second attempt goes through the same clean path.
        let err = capture.start(|_| {}).unwrap_err();
        assert!(matches!(err, Error::CaptureUnavailable(_)));
        capture.stop();
    }
}
