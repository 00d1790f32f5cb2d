use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Sink};

use crate::error::{Error, Result};
use crate::protocol::models::OUTPUT_SAMPLE_RATE;

use super::scheduler::{MonotonicClock, PlaybackScheduler, decode_pcm16};

/// How often the audio thread polls for the level observer when none was
/// configured explicitly.
const DEFAULT_METER_INTERVAL: Duration = Duration::from_millis(50);

pub type LevelObserver = Box<dyn Fn(f32) + Send>;

enum PlaybackCommand {
    AddChunk {
        pcm: Vec<u8>,
        reply: mpsc::Sender<Result<()>>,
    },
    Flush,
    Resume {
        reply: mpsc::Sender<Result<()>>,
    },
    SetDevice {
        name: String,
        reply: mpsc::Sender<Result<()>>,
    },
    SetLevelObserver {
        observer: LevelObserver,
        interval: Duration,
    },
    Queued {
        reply: mpsc::Sender<usize>,
    },
    Shutdown,
}

/// Speaker-side pipeline: inbound PCM chunks in, gapless sound out.
///
/// `rodio::OutputStream` is `!Send` on some platforms, so the output graph
/// lives on a dedicated OS thread; this handle proxies every operation
/// through a command channel and is itself `Send + Sync`. Chunks queue ahead
/// of real time so network jitter between successive chunks never produces
/// an audible gap, and `flush` takes effect before any chunk queued after it.
pub struct AudioPlayback {
    cmd_tx: mpsc::Sender<PlaybackCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl AudioPlayback {
    /// Open the default output device and spawn the audio thread.
    ///
    /// # Errors
    /// [`Error::PlaybackUnavailable`] if the output device cannot be opened.
    pub fn new() -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<PlaybackCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<()>>();

        let thread = thread::Builder::new()
            .name("live-playback".into())
            .spawn(move || run(&cmd_rx, &init_tx))
            .map_err(|e| Error::PlaybackUnavailable(format!("failed to spawn audio thread: {e}")))?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::PlaybackUnavailable(
                    "audio thread died during setup".to_string(),
                ));
            }
        }

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }

    /// Decode raw PCM16 bytes and schedule them after everything already
    /// queued (or at "now" when the queue is empty).
    ///
    /// # Errors
    /// [`Error::PlaybackDecode`] on a malformed payload; the chunk is
    /// dropped and the scheduling clock is untouched.
    pub fn add_chunk(&self, pcm: &[u8]) -> Result<()> {
        self.request(|reply| PlaybackCommand::AddChunk {
            pcm: pcm.to_vec(),
            reply,
        })
    }

    /// Immediately halt whatever is sounding, clear the pending queue, and
    /// reset the clock baseline. Effective before any chunk queued after
    /// this call.
    pub fn flush(&self) {
        let _ = self.cmd_tx.send(PlaybackCommand::Flush);
    }

    /// Alias of [`Self::flush`]; the interruption path and explicit stop
    /// share one behavior.
    pub fn stop(&self) {
        self.flush();
    }

    /// Un-suspend the output graph (it may start suspended pending a user
    /// gesture, depending on platform policy).
    ///
    /// # Errors
    /// [`Error::PlaybackUnavailable`] if the audio thread is gone.
    pub fn resume(&self) -> Result<()> {
        self.request(|reply| PlaybackCommand::Resume { reply })
    }

    /// Redirect future output to the named device. Pending chunks are
    /// carried over best-effort.
    ///
    /// # Errors
    /// [`Error::PlaybackUnavailable`] if the device does not exist or cannot
    /// be opened; the previous device keeps playing in that case.
    pub fn set_device(&self, name: &str) -> Result<()> {
        self.request(|reply| PlaybackCommand::SetDevice {
            name: name.to_string(),
            reply,
        })
    }

    /// Attach a volume meter polled at `interval`. Advisory: runs on the
    /// audio thread between commands and never delays scheduling.
    pub fn set_level_observer<F>(&self, observer: F, interval: Duration)
    where
        F: Fn(f32) + Send + 'static,
    {
        let _ = self.cmd_tx.send(PlaybackCommand::SetLevelObserver {
            observer: Box::new(observer),
            interval,
        });
    }

    /// Number of buffers not yet fully played.
    #[must_use]
    pub fn queued(&self) -> usize {
        let (tx, rx) = mpsc::channel();
        if self.cmd_tx.send(PlaybackCommand::Queued { reply: tx }).is_err() {
            return 0;
        }
        rx.recv().unwrap_or(0)
    }

    fn request(
        &self,
        build: impl FnOnce(mpsc::Sender<Result<()>>) -> PlaybackCommand,
    ) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| Error::PlaybackUnavailable("audio thread died".to_string()))?;
        rx.recv()
            .map_err(|_| Error::PlaybackUnavailable("audio thread died".to_string()))?
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(PlaybackCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct PlaybackThread {
    // Field order matters: the sink must drop before the stream it plays on.
    sink: Sink,
    handle: OutputStreamHandle,
    _stream: OutputStream,
    scheduler: PlaybackScheduler<MonotonicClock>,
    observer: Option<LevelObserver>,
    meter_interval: Duration,
}

fn run(cmd_rx: &mpsc::Receiver<PlaybackCommand>, init_tx: &mpsc::Sender<Result<()>>) {
    let (stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(err) => {
            let _ = init_tx.send(Err(Error::PlaybackUnavailable(err.to_string())));
            return;
        }
    };
    let sink = match Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(err) => {
            let _ = init_tx.send(Err(Error::PlaybackUnavailable(err.to_string())));
            return;
        }
    };
    if init_tx.send(Ok(())).is_err() {
        return;
    }

    let mut state = PlaybackThread {
        sink,
        handle,
        _stream: stream,
        scheduler: PlaybackScheduler::new(MonotonicClock::new()),
        observer: None,
        meter_interval: DEFAULT_METER_INTERVAL,
    };
    let mut last_meter = std::time::Instant::now();

    loop {
        match cmd_rx.recv_timeout(state.meter_interval) {
            Ok(PlaybackCommand::AddChunk { pcm, reply }) => {
                let _ = reply.send(state.add_chunk(&pcm));
            }
            Ok(PlaybackCommand::Flush) => state.flush(),
            Ok(PlaybackCommand::Resume { reply }) => {
                state.sink.play();
                let _ = reply.send(Ok(()));
            }
            Ok(PlaybackCommand::SetDevice { name, reply }) => {
                let _ = reply.send(state.set_device(&name));
            }
            Ok(PlaybackCommand::SetLevelObserver { observer, interval }) => {
                state.observer = Some(observer);
                state.meter_interval = interval;
            }
            Ok(PlaybackCommand::Queued { reply }) => {
                let _ = reply.send(state.scheduler.pending().len());
            }
            Ok(PlaybackCommand::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        if let Some(observer) = &state.observer {
            if last_meter.elapsed() >= state.meter_interval {
                observer(state.scheduler.current_level());
                last_meter = std::time::Instant::now();
            }
        }
    }

    tracing::debug!("Playback thread shutting down");
}

impl PlaybackThread {
    fn add_chunk(&mut self, pcm: &[u8]) -> Result<()> {
        let samples = match decode_pcm16(pcm) {
            Ok(samples) => samples,
            Err(err) => {
                tracing::warn!("dropping malformed audio chunk: {err}");
                return Err(err);
            }
        };
        if samples.is_empty() {
            return Ok(());
        }
        self.scheduler.schedule(samples.clone());
        self.sink
            .append(SamplesBuffer::new(1, OUTPUT_SAMPLE_RATE, samples));
        Ok(())
    }

    fn flush(&mut self) {
        self.sink.stop();
        self.scheduler.flush();
        // A stopped sink stays usable, but a fresh one avoids edge cases
        // around paused-after-stop state on some backends.
        if let Ok(sink) = Sink::try_new(&self.handle) {
            self.sink = sink;
        }
    }

    fn set_device(&mut self, name: &str) -> Result<()> {
        let host = rodio::cpal::default_host();
        let device = host
            .output_devices()
            .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::PlaybackUnavailable(format!("no output device named {name:?}")))?;

        let (stream, handle) = OutputStream::try_from_device(&device)
            .map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;
        let sink =
            Sink::try_new(&handle).map_err(|e| Error::PlaybackUnavailable(e.to_string()))?;

        // Carry not-yet-finished buffers onto the new device. The buffer that
        // is sounding right now restarts from its beginning; platforms do not
        // let a source migrate mid-flight.
        for buffer in self.scheduler.pending() {
            sink.append(SamplesBuffer::new(
                1,
                OUTPUT_SAMPLE_RATE,
                buffer.samples.clone(),
            ));
        }

        self.sink = sink;
        self.handle = handle;
        self._stream = stream;
        tracing::info!("Playback redirected to {name:?}");
        Ok(())
    }
}
