pub mod channels;
pub mod tone;

pub use channels::{PrimaryAudio, SynthesizedAudio};
pub use tone::AlarmTone;

use anyhow::{anyhow, Result};
use rodio::{Decoder, OutputStream, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// How long a start request may take before the device is considered unavailable.
const START_TIMEOUT: Duration = Duration::from_secs(2);

type Reply = oneshot::Sender<Result<(), String>>;

enum AudioCommand {
    PlayFile {
        path: PathBuf,
        volume: f32,
        reply: Reply,
    },
    PlayTone {
        period: Duration,
        volume: f32,
        reply: Reply,
    },
    Stop,
}

/// Handle to a dedicated audio thread.
///
/// `OutputStream` is not `Send`, so the stream and sink live on their own
/// thread and are driven through a command channel. Each alert channel owns
/// one engine; stopping it drops the sink and the output stream.
pub struct AudioEngineHandle {
    name: &'static str,
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
    is_playing: Arc<AtomicBool>,
}

impl AudioEngineHandle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tx: Arc::new(Mutex::new(None)),
            is_playing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|_| anyhow!("audio engine lock poisoned"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let is_playing = Arc::clone(&self.is_playing);
        let name = self.name;

        thread::Builder::new()
            .name(format!("audio-{name}"))
            .spawn(move || {
                let mut stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn open_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    let (s, handle) = OutputStream::try_default()
                        .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                    let new_sink = Sink::try_new(&handle)
                        .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                    *stream = Some(s);
                    *sink = Some(new_sink);
                    Ok(())
                }

                fn release(stream: &mut Option<OutputStream>, sink: &mut Option<Sink>) {
                    if let Some(old) = sink.take() {
                        old.stop();
                    }
                    *stream = None;
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::PlayFile {
                            path,
                            volume,
                            reply,
                        } => {
                            release(&mut stream, &mut sink);
                            let result: Result<(), String> = (|| {
                                let file = File::open(&path).map_err(|e| {
                                    format!("Failed to open {}: {}", path.display(), e)
                                })?;
                                let source = Decoder::new(BufReader::new(file)).map_err(|e| {
                                    format!("Failed to decode {}: {}", path.display(), e)
                                })?;
                                open_sink(&mut stream, &mut sink)?;
                                if let Some(ref s) = sink {
                                    s.set_volume(volume.clamp(0.0, 1.0));
                                    s.append(source.repeat_infinite());
                                    s.play();
                                }
                                Ok(())
                            })();
                            if result.is_err() {
                                release(&mut stream, &mut sink);
                            }
                            is_playing.store(result.is_ok(), Ordering::SeqCst);
                            let _ = reply.send(result);
                        }
                        AudioCommand::PlayTone {
                            period,
                            volume,
                            reply,
                        } => {
                            release(&mut stream, &mut sink);
                            let result: Result<(), String> = open_sink(&mut stream, &mut sink).map(|_| {
                                if let Some(ref s) = sink {
                                    s.set_volume(volume.clamp(0.0, 1.0));
                                    s.append(AlarmTone::new(period));
                                    s.play();
                                }
                            });
                            is_playing.store(result.is_ok(), Ordering::SeqCst);
                            let _ = reply.send(result);
                        }
                        AudioCommand::Stop => {
                            release(&mut stream, &mut sink);
                            is_playing.store(false, Ordering::SeqCst);
                        }
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn audio thread: {e}"))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    async fn request(&self, build: impl FnOnce(Reply) -> AudioCommand) -> Result<()> {
        let tx = self.ensure_thread()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(build(reply_tx))
            .map_err(|_| anyhow!("audio thread for {} exited", self.name))?;

        match tokio::time::timeout(START_TIMEOUT, reply_rx).await {
            Ok(Ok(Ok(()))) => {
                log_debug!("audio engine {} started", self.name);
                Ok(())
            }
            Ok(Ok(Err(reason))) => Err(anyhow!(reason)),
            Ok(Err(_)) => Err(anyhow!("audio thread for {} dropped the reply", self.name)),
            Err(_) => {
                self.stop();
                Err(anyhow!("audio device for {} did not respond", self.name))
            }
        }
    }

    pub async fn play_file(&self, path: PathBuf, volume: f32) -> Result<()> {
        self.request(|reply| AudioCommand::PlayFile {
            path,
            volume,
            reply,
        })
        .await
    }

    pub async fn play_tone(&self, period: Duration, volume: f32) -> Result<()> {
        self.request(|reply| AudioCommand::PlayTone {
            period,
            volume,
            reply,
        })
        .await
    }

    /// Silence and release the output device. No-op when nothing is playing.
    pub fn stop(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            if tx.send(AudioCommand::Stop).is_err() {
                log_warn!("audio thread for {} already gone", self.name);
            }
        }
        self.is_playing.store(false, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }
}
