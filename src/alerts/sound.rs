// THEORY:
// Playing a sound must never stall the processing loop. The asset is read
// into memory once at startup; every alert only posts a command to a
// dedicated audio thread, which opens the output device lazily and mixes
// each clip on top of whatever is still playing.
//
// A missing asset is a startup warning, not an error: the dispatcher simply
// runs without a sound and alerts stay silent.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "audio")]
pub use engine::RodioAlertSound;

/// Anything that can make an alert audible.
pub trait AlertSound: Send {
    /// Starts playback and returns immediately.
    fn play(&self) -> anyhow::Result<()>;
}

/// Encoded audio clip held in memory.
#[derive(Debug, Clone)]
pub struct SoundAsset {
    path: PathBuf,
    bytes: Arc<[u8]>,
}

impl SoundAsset {
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path)?;
        if bytes.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is empty", path.display()),
            ));
        }
        Ok(Self {
            path,
            bytes: bytes.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(feature = "audio")]
mod engine {
    use super::{AlertSound, SoundAsset};
    use anyhow::{anyhow, Context};
    use log::{debug, warn};
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Source};
    use std::io::Cursor;
    use std::sync::mpsc::{self, Sender};
    use std::thread;

    enum AudioCommand {
        Play,
    }

    /// Handle to the audio thread. Dropping it stops the thread.
    pub struct RodioAlertSound {
        tx: Sender<AudioCommand>,
    }

    impl RodioAlertSound {
        pub fn spawn(asset: SoundAsset) -> anyhow::Result<Self> {
            let (tx, rx) = mpsc::channel();
            thread::Builder::new()
                .name("alert-audio".into())
                .spawn(move || {
                    // OutputStream is !Send, so it is created and kept here.
                    let mut output: Option<(OutputStream, OutputStreamHandle)> = None;
                    while let Ok(AudioCommand::Play) = rx.recv() {
                        if output.is_none() {
                            match OutputStream::try_default() {
                                Ok(pair) => output = Some(pair),
                                Err(err) => {
                                    warn!("no audio output device: {err}");
                                    continue;
                                }
                            }
                        }
                        let Some((_, handle)) = &output else { continue };
                        match Decoder::new(Cursor::new(asset.bytes())) {
                            Ok(source) => {
                                if let Err(err) = handle.play_raw(source.convert_samples()) {
                                    warn!("failed to play {}: {err}", asset.path().display());
                                }
                            }
                            Err(err) => warn!("failed to decode {}: {err}", asset.path().display()),
                        }
                    }
                    debug!("audio thread exiting");
                })
                .context("failed to spawn audio thread")?;
            Ok(Self { tx })
        }
    }

    impl AlertSound for RodioAlertSound {
        fn play(&self) -> anyhow::Result<()> {
            self.tx
                .send(AudioCommand::Play)
                .map_err(|_| anyhow!("audio thread has stopped"))
        }
    }
}
