use crate::alerts::{AlertDispatcher, AlertMailer, AlertSound};
use crate::camera::{CameraOpener, FrameSource};
use crate::config::{DetectionParams, SentryConfig, SharedParams};
use crate::core_modules::overlay::OverlayPainter;
use crate::error::{Result, SentryError};
use crate::processing::loop_worker;
use crate::processing::publish::{FrameBus, Notice, Status};
use crate::recording::{RecordingSession, SinkFactory};
use chrono::Local;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) type CameraSlot = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingToggle {
    Started(PathBuf),
    Saved(PathBuf),
}

/// External collaborators handed to the controller.
pub struct Devices {
    pub camera: Arc<dyn CameraOpener>,
    pub recorder: Arc<dyn SinkFactory>,
    pub sound: Option<Box<dyn AlertSound>>,
    pub mailer: Option<Box<dyn AlertMailer>>,
}

/// State reachable from both the controller and the loop worker.
///
/// Lock order, where more than one is held: `run_state`, then `recording` or
/// `alerts`, then `frame_size`.
pub(crate) struct Shared {
    pub(crate) config: SentryConfig,
    pub(crate) params: SharedParams,
    pub(crate) bus: FrameBus,
    pub(crate) painter: OverlayPainter,
    pub(crate) alerts: Mutex<AlertDispatcher>,
    pub(crate) run_state: Mutex<RunState>,
    pub(crate) recording: Mutex<Option<RecordingSession>>,
    pub(crate) frame_size: Mutex<Option<(u32, u32)>>,
    sinks: Arc<dyn SinkFactory>,
}

impl Shared {
    /// Running → Stopping. Returns true for the caller that owns the teardown.
    pub(crate) fn begin_stopping(&self) -> bool {
        let mut state = lock(&self.run_state);
        if *state == RunState::Running {
            *state = RunState::Stopping;
            true
        } else {
            false
        }
    }

    /// Closes the active recording, if any, and announces the saved file.
    pub(crate) fn stop_recording(&self) -> Option<PathBuf> {
        let session = lock(&self.recording).take()?;
        match session.finish() {
            Ok(path) => {
                self.bus.notify(Notice::RecordingSaved(path.clone()));
                Some(path)
            }
            Err(err) => {
                error!("failed to close recording: {err}");
                self.bus.notify(Notice::Error(format!("Failed to save recording: {err}")));
                None
            }
        }
    }

    /// Releases the camera (if nobody is blocked on it), clears the published
    /// frame and returns to Idle.
    pub(crate) fn finish_stopping(&self, camera: Option<&CameraSlot>) {
        if let Some(camera) = camera {
            match camera.try_lock() {
                Ok(mut slot) => release(&mut slot),
                Err(TryLockError::Poisoned(poisoned)) => release(&mut poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    warn!("camera is still busy in a read; it will be released when the worker exits")
                }
            }
        }
        let mut state = lock(&self.run_state);
        *lock(&self.frame_size) = None;
        self.bus.clear_frame();
        self.bus.set_status(Status::Stopped);
        *state = RunState::Idle;
        drop(state);
        info!("Detection stopped");
    }
}

pub(crate) fn release(slot: &mut Option<Box<dyn FrameSource>>) {
    if let Some(mut source) = slot.take() {
        source.close();
        debug!("camera released");
    }
}

struct ActiveRun {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    camera: CameraSlot,
}

/// Command surface for the presentation shell.
pub struct DetectionController {
    shared: Arc<Shared>,
    camera: Arc<dyn CameraOpener>,
    run: Option<ActiveRun>,
}

impl DetectionController {
    pub fn new(config: SentryConfig, devices: Devices) -> Self {
        let painter = OverlayPainter::from_font_file(config.overlay_font.as_deref());
        let mut alerts = AlertDispatcher::new(config.audio_cooldown, config.email_cooldown);
        if let Some(sound) = devices.sound {
            alerts = alerts.with_sound(sound);
        }
        if let Some(mailer) = devices.mailer {
            alerts = alerts.with_mailer(mailer);
        }
        let shared = Shared {
            params: SharedParams::new(config.initial_params),
            bus: FrameBus::default(),
            painter,
            alerts: Mutex::new(alerts),
            run_state: Mutex::new(RunState::Idle),
            recording: Mutex::new(None),
            frame_size: Mutex::new(None),
            sinks: devices.recorder,
            config,
        };
        Self {
            shared: Arc::new(shared),
            camera: devices.camera,
            run: None,
        }
    }

    pub fn bus(&self) -> &FrameBus {
        &self.shared.bus
    }

    pub fn config(&self) -> &SentryConfig {
        &self.shared.config
    }

    pub fn run_state(&self) -> RunState {
        *lock(&self.shared.run_state)
    }

    pub fn status(&self) -> Status {
        self.shared.bus.status()
    }

    pub fn params(&self) -> DetectionParams {
        self.shared.params.snapshot()
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.shared.recording).is_some()
    }

    pub fn email_enabled(&self) -> bool {
        lock(&self.shared.alerts).email_enabled()
    }

    pub async fn start_detection(&mut self) -> Result<()> {
        if self.run_state() != RunState::Idle {
            return Err(SentryError::AlreadyRunning);
        }
        self.reap_finished_run().await;

        let opener = Arc::clone(&self.camera);
        let opened = tokio::task::spawn_blocking(move || opener.open())
            .await
            .map_err(|err| SentryError::Worker(err.to_string()))?;
        let mut source = match opened {
            Ok(source) => source,
            Err(err) => {
                error!("{err}");
                self.shared.bus.notify(Notice::Error("Could not open camera.".into()));
                return Err(err.into());
            }
        };

        {
            let mut state = lock(&self.shared.run_state);
            if *state != RunState::Idle {
                source.close();
                return Err(SentryError::AlreadyRunning);
            }
            *state = RunState::Running;
        }
        *lock(&self.shared.frame_size) = Some(source.frame_size());
        lock(&self.shared.alerts).reset_audio_timer();
        self.shared.bus.set_status(Status::Running);

        let camera: CameraSlot = Arc::new(Mutex::new(Some(source)));
        let cancel = CancellationToken::new();
        let handle = tokio::task::spawn_blocking({
            let shared = Arc::clone(&self.shared);
            let camera = Arc::clone(&camera);
            let cancel = cancel.clone();
            move || loop_worker::run_detection_loop(shared, camera, cancel)
        });
        self.run = Some(ActiveRun { handle, cancel, camera });
        info!("Detection started on camera {}", self.shared.config.camera_index);
        Ok(())
    }

    pub async fn stop_detection(&mut self) -> Result<()> {
        let owns_teardown = self.shared.begin_stopping();
        let run = self.run.take();
        if !owns_teardown && run.is_none() {
            return Err(SentryError::NotRunning);
        }
        if owns_teardown {
            self.shared.stop_recording();
        }

        let camera = match run {
            Some(ActiveRun { handle, cancel, camera }) => {
                cancel.cancel();
                match tokio::time::timeout(self.shared.config.join_timeout, handle).await {
                    Ok(Ok(())) => debug!("processing worker joined"),
                    Ok(Err(err)) => error!("processing worker failed: {err}"),
                    Err(_) => warn!(
                        "processing worker did not exit within {:?}, forcing teardown",
                        self.shared.config.join_timeout
                    ),
                }
                Some(camera)
            }
            None => None,
        };

        if owns_teardown {
            self.shared.finish_stopping(camera.as_ref());
        }
        Ok(())
    }

    /// Orderly shutdown: recording first, then detection.
    pub async fn shutdown(&mut self) {
        self.shared.stop_recording();
        match self.stop_detection().await {
            Ok(()) | Err(SentryError::NotRunning) => {}
            Err(err) => warn!("shutdown: {err}"),
        }
    }

    pub fn toggle_recording(&self) -> Result<RecordingToggle> {
        let state = lock(&self.shared.run_state);
        let mut recording = lock(&self.shared.recording);

        if let Some(session) = recording.take() {
            let saved = session.finish();
            let running = *state == RunState::Running;
            drop(recording);
            drop(state);
            if running {
                self.shared.bus.set_status(Status::Running);
            }
            return match saved {
                Ok(path) => {
                    self.shared.bus.notify(Notice::RecordingSaved(path.clone()));
                    Ok(RecordingToggle::Saved(path))
                }
                Err(err) => {
                    error!("failed to close recording: {err}");
                    self.shared.bus.notify(Notice::Error(format!("Failed to save recording: {err}")));
                    Err(err.into())
                }
            };
        }

        if *state != RunState::Running {
            warn!("recording requested while detection is not running");
            self.shared
                .bus
                .notify(Notice::Warning("Start detection first before recording.".into()));
            return Err(SentryError::NotRunning);
        }

        let size = lock(&self.shared.frame_size).unwrap_or((0, 0));
        let config = &self.shared.config;
        let session = RecordingSession::start(
            self.shared.sinks.as_ref(),
            &config.recordings_dir,
            size,
            config.recording_fps,
            Local::now(),
        )
        .inspect_err(|err| {
            error!("could not start recording: {err}");
            self.shared.bus.notify(Notice::Error(format!("Could not start recording: {err}")));
        })?;
        let path = session.path().to_path_buf();
        *recording = Some(session);
        drop(recording);
        drop(state);

        self.shared.bus.notify(Notice::RecordingStarted(path.clone()));
        self.shared.bus.set_status(Status::Recording);
        Ok(RecordingToggle::Started(path))
    }

    /// Flips email alerts and returns the new setting.
    pub fn toggle_email(&self) -> Result<bool> {
        let state = lock(&self.shared.run_state);
        let mut alerts = lock(&self.shared.alerts);
        if alerts.email_enabled() {
            alerts.set_email_enabled(false)?;
            info!("Email alerts disabled");
            return Ok(false);
        }
        if *state != RunState::Running {
            return Err(SentryError::NotRunning);
        }
        alerts.set_email_enabled(true)?;
        info!("Email alerts enabled");
        Ok(true)
    }

    pub fn set_sensitivity(&self, value: u32) -> Result<()> {
        self.require_running()?;
        self.shared.params.set_sensitivity(value)
    }

    pub fn set_min_area(&self, value: u32) -> Result<()> {
        self.require_running()?;
        self.shared.params.set_min_area(value)
    }

    pub fn set_threshold(&self, value: u32) -> Result<()> {
        self.require_running()?;
        self.shared.params.set_threshold(value)
    }

    fn require_running(&self) -> Result<()> {
        match self.run_state() {
            RunState::Running => Ok(()),
            _ => Err(SentryError::NotRunning),
        }
    }

    /// Joins a worker that already tore itself down after a camera failure.
    async fn reap_finished_run(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel.cancel();
            if tokio::time::timeout(self.shared.config.join_timeout, run.handle).await.is_err() {
                warn!("previous processing worker is still blocked; detaching it");
            }
        }
    }
}

impl Drop for DetectionController {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.cancel.cancel();
        }
        self.shared.stop_recording();
    }
}
