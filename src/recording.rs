// THEORY:
// A recording session is one video file being filled with annotated frames.
//
// - The file lives under the recordings directory and is named after the
//   wall-clock second it was started: `motion_YYYYMMDD_HHMMSS.<ext>`. Two
//   sessions started in the same second get a numeric suffix instead of
//   overwriting each other.
// - The encoder itself is external (OpenCV in the console, an in-memory sink
//   in tests) and is reached through `SinkFactory` / `VideoSink`.
// - A failed append is logged and the session keeps going; only opening and
//   finishing report errors to the caller.

use crate::core_modules::frame::Frame;
use crate::error::RecordingError;
use chrono::{DateTime, Local};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "motion_";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// An open video file accepting frames.
pub trait VideoSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError>;

    /// Flushes and closes the file. Called exactly once.
    fn finish(&mut self) -> Result<(), RecordingError>;
}

/// Creates sinks for a given container format.
pub trait SinkFactory: Send + Sync {
    fn open(&self, path: &Path, width: u32, height: u32, fps: f64) -> Result<Box<dyn VideoSink>, RecordingError>;

    /// File extension without the leading dot, e.g. `avi`.
    fn container_extension(&self) -> &str;
}

/// Picks a file name under `dir` that does not exist yet.
pub fn recording_path(dir: &Path, started: DateTime<Local>, extension: &str) -> PathBuf {
    let stem = format!("{FILE_PREFIX}{}", started.format(STAMP_FORMAT));
    let first = dir.join(format!("{stem}.{extension}"));
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| dir.join(format!("{stem}_{n}.{extension}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

pub struct RecordingSession {
    path: PathBuf,
    sink: Box<dyn VideoSink>,
    width: u32,
    height: u32,
    fps: f64,
    frames_written: u64,
    failed_writes: u64,
}

impl RecordingSession {
    pub fn start(
        factory: &dyn SinkFactory,
        dir: &Path,
        (width, height): (u32, u32),
        fps: f64,
        started: DateTime<Local>,
    ) -> Result<Self, RecordingError> {
        fs::create_dir_all(dir)?;
        let path = recording_path(dir, started, factory.container_extension());
        let sink = factory.open(&path, width, height, fps)?;
        info!("Recording started: {}", path.display());
        Ok(Self {
            path,
            sink,
            width,
            height,
            fps,
            frames_written: 0,
            failed_writes: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Playback length of what was written so far at the nominal frame rate.
    pub fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.frames_written as f64 / self.fps
        } else {
            0.0
        }
    }

    /// Appends one frame. Write errors are logged, not returned.
    pub fn append(&mut self, frame: &Frame) {
        let (width, height) = self.frame_size();
        if frame.dimensions() != (width, height) {
            self.note_failure(&format!(
                "frame is {}x{}, writer expects {width}x{height}",
                frame.width(),
                frame.height(),
            ));
            return;
        }
        match self.sink.write(frame) {
            Ok(()) => self.frames_written += 1,
            Err(err) => self.note_failure(&err.to_string()),
        }
    }

    fn note_failure(&mut self, reason: &str) {
        // Only the first failure is worth a line; the rest would flood at 30 fps.
        if self.failed_writes == 0 {
            warn!("dropping frame for {}: {reason}", self.path.display());
        }
        self.failed_writes += 1;
    }

    /// Closes the writer and returns the saved path.
    pub fn finish(mut self) -> Result<PathBuf, RecordingError> {
        self.sink.finish()?;
        info!(
            "Recording saved: {} ({} frames, {:.1}s at {} fps, {} dropped)",
            self.path.display(),
            self.frames_written,
            self.duration_secs(),
            self.fps(),
            self.failed_writes
        );
        Ok(self.path)
    }
}
