#![allow(dead_code)]

use image::Rgb;
use motion_sentry::alerts::email::{AlertMailer, EmailAlert};
use motion_sentry::camera::{CameraOpener, FrameSource};
use motion_sentry::error::{CameraError, RecordingError};
use motion_sentry::pipeline::Frame;
use motion_sentry::processing::Notice;
use motion_sentry::recording::{SinkFactory, VideoSink};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast;

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 120;
pub const BACKGROUND: [u8; 3] = [60, 60, 60];
pub const OBJECT: [u8; 3] = [220, 220, 220];
pub const SQUARE: u32 = 50;

pub fn static_frame() -> Frame {
    Frame::from_pixel(WIDTH, HEIGHT, Rgb(BACKGROUND))
}

/// Static scene with a bright square whose top-left corner is at (x, y).
pub fn frame_with_square(x: u32, y: u32) -> Frame {
    let mut frame = static_frame();
    for py in y..y + SQUARE {
        for px in x..x + SQUARE {
            frame.put_pixel(px, py, Rgb(OBJECT));
        }
    }
    frame
}

#[derive(Clone, Default)]
pub struct CameraProbe {
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub reads: Arc<AtomicUsize>,
}

impl CameraProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Frame served instead of the still frame once the switch is flipped.
#[derive(Clone)]
pub struct SceneChange {
    pub switch: Arc<AtomicBool>,
    pub frame: Frame,
}

impl SceneChange {
    pub fn new(frame: Frame) -> Self {
        Self {
            switch: Arc::new(AtomicBool::new(false)),
            frame,
        }
    }

    pub fn trigger(&self) {
        self.switch.store(true, Ordering::SeqCst);
    }
}

/// Serves one still frame per read, optionally failing after a number of reads.
pub struct FakeCamera {
    frame: Frame,
    scene_change: Option<SceneChange>,
    fail_after: Option<usize>,
    read_delay: Duration,
    probe: CameraProbe,
    served: usize,
    closed: bool,
}

impl FrameSource for FakeCamera {
    fn read(&mut self) -> Result<Frame, CameraError> {
        if self.closed {
            return Err(CameraError::Closed);
        }
        if self.fail_after.is_some_and(|limit| self.served >= limit) {
            return Err(CameraError::EndOfStream);
        }
        thread::sleep(self.read_delay);
        self.served += 1;
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        match &self.scene_change {
            Some(change) if change.switch.load(Ordering::SeqCst) => Ok(change.frame.clone()),
            _ => Ok(self.frame.clone()),
        }
    }

    fn frame_size(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub struct FakeCameraOpener {
    pub frame: Frame,
    pub scene_change: Option<SceneChange>,
    pub fail_after: Option<usize>,
    pub read_delay: Duration,
    pub fail_open: bool,
    pub probe: CameraProbe,
}

impl Default for FakeCameraOpener {
    fn default() -> Self {
        Self {
            frame: static_frame(),
            scene_change: None,
            fail_after: None,
            read_delay: Duration::from_millis(2),
            fail_open: false,
            probe: CameraProbe::default(),
        }
    }
}

impl CameraOpener for FakeCameraOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        if self.fail_open {
            return Err(CameraError::Open {
                index: 0,
                reason: "no such device".into(),
            });
        }
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCamera {
            frame: self.frame.clone(),
            scene_change: self.scene_change.clone(),
            fail_after: self.fail_after,
            read_delay: self.read_delay,
            probe: self.probe.clone(),
            served: 0,
            closed: false,
        }))
    }
}

#[derive(Debug, Default)]
pub struct RecorderLog {
    pub opened: Vec<PathBuf>,
    pub frames: HashMap<PathBuf, usize>,
    pub finished: Vec<PathBuf>,
}

/// Sink factory that only counts; touches an empty file so names stay unique.
#[derive(Clone, Default)]
pub struct MemoryRecorder {
    pub log: Arc<Mutex<RecorderLog>>,
}

struct MemorySink {
    path: PathBuf,
    log: Arc<Mutex<RecorderLog>>,
}

impl VideoSink for MemorySink {
    fn write(&mut self, _frame: &Frame) -> Result<(), RecordingError> {
        *self.log.lock().unwrap().frames.entry(self.path.clone()).or_default() += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RecordingError> {
        self.log.lock().unwrap().finished.push(self.path.clone());
        Ok(())
    }
}

impl SinkFactory for MemoryRecorder {
    fn open(&self, path: &Path, _width: u32, _height: u32, _fps: f64) -> Result<Box<dyn VideoSink>, RecordingError> {
        fs::write(path, b"")?;
        self.log.lock().unwrap().opened.push(path.to_path_buf());
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            log: Arc::clone(&self.log),
        }))
    }

    fn container_extension(&self) -> &str {
        "avi"
    }
}

/// Keeps every alert handed to it instead of sending mail.
#[derive(Clone, Default)]
pub struct OutboxMailer {
    pub sent: Arc<Mutex<Vec<EmailAlert>>>,
}

impl OutboxMailer {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl AlertMailer for OutboxMailer {
    fn dispatch(&self, alert: EmailAlert) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(alert);
        Ok(())
    }
}

pub fn drain(rx: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        out.push(notice);
    }
    out
}

pub async fn wait_until(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
