// THEORY:
// Configuration comes in two flavours.
//
// 1.  **Live tuning knobs** (`DetectionParams`): sensitivity, minimum area and
//     binarization threshold. The shell writes them at any time through
//     `SharedParams`; the processing loop takes one `snapshot()` per cycle so
//     a cycle never sees a half-applied change. Last write wins per field.
// 2.  **Session configuration** (`SentryConfig`, `EmailConfig`): where files
//     live, how often alerts may fire, how fast the loop spins, and how to
//     reach the mail relay. Fixed for the lifetime of a controller.

use crate::error::{ConfigError, SentryError};
use lettre::message::Mailbox;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

pub const SENSITIVITY_RANGE: (u32, u32) = (100, 1000);
pub const MIN_AREA_RANGE: (u32, u32) = (100, 2000);
pub const THRESHOLD_RANGE: (u32, u32) = (50, 250);

pub const RECORDINGS_DIR: &str = "recordings";
pub const ALERT_SOUND_FILE: &str = "alert.wav";

/// The three parameters the operator can tune while detection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionParams {
    /// History length of the background model; higher adapts more slowly.
    pub sensitivity: u32,
    /// Smallest contour area (in pixels) that counts as motion.
    pub min_area: u32,
    /// Binarization threshold applied to the blurred foreground mask.
    pub threshold: u8,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            sensitivity: 500,
            min_area: 500,
            threshold: 200,
        }
    }
}

fn check_range(name: &'static str, value: u32, (min, max): (u32, u32)) -> Result<u32, SentryError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(SentryError::InvalidParameter { name, value, min, max })
    }
}

/// Guarded accessor shared between the shell and the processing loop.
#[derive(Debug, Clone, Default)]
pub struct SharedParams {
    inner: Arc<RwLock<DetectionParams>>,
}

impl SharedParams {
    pub fn new(params: DetectionParams) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    pub fn snapshot(&self) -> DetectionParams {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_sensitivity(&self, value: u32) -> Result<(), SentryError> {
        let value = check_range("sensitivity", value, SENSITIVITY_RANGE)?;
        self.update(|p| p.sensitivity = value);
        Ok(())
    }

    pub fn set_min_area(&self, value: u32) -> Result<(), SentryError> {
        let value = check_range("min_area", value, MIN_AREA_RANGE)?;
        self.update(|p| p.min_area = value);
        Ok(())
    }

    pub fn set_threshold(&self, value: u32) -> Result<(), SentryError> {
        let value = check_range("threshold", value, THRESHOLD_RANGE)?;
        self.update(|p| p.threshold = value as u8);
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut DetectionParams)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
    }
}

/// Mail relay settings for snapshot alerts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    /// Login name; also used as the sender address.
    pub username: String,
    pub password: String,
    pub recipient: String,
}

impl EmailConfig {
    pub const DEFAULT_PORT: u16 = 587;

    /// Rejects configurations that could never send a message.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smtp_server.trim().is_empty() {
            return Err(ConfigError::MissingField("smtp_server"));
        }
        if self.smtp_port == 0 {
            return Err(ConfigError::InvalidPort(self.smtp_port));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingField("username"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::MissingField("password"));
        }
        self.sender()?;
        self.recipient_mailbox()?;
        Ok(())
    }

    pub fn sender(&self) -> Result<Mailbox, ConfigError> {
        self.username
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.username.clone()))
    }

    pub fn recipient_mailbox(&self) -> Result<Mailbox, ConfigError> {
        self.recipient
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.recipient.clone()))
    }
}

/// Everything a detection controller needs that does not change while it lives.
#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub camera_index: i32,
    /// Directory the executable lives in; relative assets resolve against it.
    pub install_dir: PathBuf,
    pub recordings_dir: PathBuf,
    pub alert_sound: PathBuf,
    pub overlay_font: Option<PathBuf>,
    pub initial_params: DetectionParams,
    pub audio_cooldown: Duration,
    pub email_cooldown: Duration,
    /// Pause at the end of every cycle.
    pub cycle_interval: Duration,
    /// How long a stop waits for the processing worker before forcing teardown.
    pub join_timeout: Duration,
    pub recording_fps: f64,
    pub email: Option<EmailConfig>,
}

impl SentryConfig {
    pub fn for_install_dir(install_dir: impl AsRef<Path>) -> Self {
        let install_dir = install_dir.as_ref().to_path_buf();
        Self {
            camera_index: 0,
            recordings_dir: install_dir.join(RECORDINGS_DIR),
            alert_sound: install_dir.join(ALERT_SOUND_FILE),
            install_dir,
            overlay_font: None,
            initial_params: DetectionParams::default(),
            audio_cooldown: Duration::from_secs(3),
            email_cooldown: Duration::from_secs(60),
            cycle_interval: Duration::from_millis(30),
            join_timeout: Duration::from_secs(1),
            recording_fps: 20.0,
            email: None,
        }
    }

    /// Resolves assets next to the running executable.
    pub fn from_current_exe() -> std::io::Result<Self> {
        let exe = std::env::current_exe()?;
        let dir = exe.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::for_install_dir(dir))
    }
}
