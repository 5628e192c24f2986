// THEORY:
// The alert dispatcher decides, once per cycle, whether a motion verdict
// should make noise. It owns two independent channels:
//
// - **audio**: a short local alert sound, fire-and-forget, rate-limited by a
//   short cooldown (3s by default);
// - **email**: a snapshot of the annotated frame sent to the operator, only
//   when enabled, rate-limited by a long cooldown (60s by default).
//
// The channels never interact: audio may fire on every qualifying cycle while
// email is cooling down, and vice versa.
//
// The email timestamp is stamped *before* the message is handed off, whatever
// happens to the send. A broken relay therefore costs one attempt per window
// instead of a burst, and the processing loop never waits on the network
// because the actual SMTP exchange runs on the mailer's own worker.

pub mod email;
pub mod sound;

use crate::core_modules::frame::{Frame, MotionVerdict};
use crate::error::SentryError;
use chrono::Local;
use log::{info, warn};
use std::time::{Duration, Instant};

pub use email::{AlertMailer, EmailAlert};
pub use sound::AlertSound;

/// Minimum spacing between two firings of one channel.
#[derive(Debug, Clone)]
pub struct Cooldown {
    period: Duration,
    last_fired: Option<Instant>,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self { period, last_fired: None }
    }

    /// True when the channel has never fired or the period has strictly elapsed.
    pub fn ready(&self, now: Instant) -> bool {
        self.last_fired
            .map(|last| now.saturating_duration_since(last) > self.period)
            .unwrap_or(true)
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_fired = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_fired = None;
    }

    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// What happened on each channel during one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertOutcome {
    pub audio_fired: bool,
    pub email_fired: bool,
}

pub struct AlertDispatcher {
    audio: Cooldown,
    email: Cooldown,
    email_enabled: bool,
    sound: Option<Box<dyn AlertSound>>,
    mailer: Option<Box<dyn AlertMailer>>,
}

impl AlertDispatcher {
    pub fn new(audio_cooldown: Duration, email_cooldown: Duration) -> Self {
        Self {
            audio: Cooldown::new(audio_cooldown),
            email: Cooldown::new(email_cooldown),
            email_enabled: false,
            sound: None,
            mailer: None,
        }
    }

    pub fn with_sound(mut self, sound: Box<dyn AlertSound>) -> Self {
        self.sound = Some(sound);
        self
    }

    pub fn with_mailer(mut self, mailer: Box<dyn AlertMailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn email_enabled(&self) -> bool {
        self.email_enabled
    }

    /// Enabling requires a configured mailer; disabling always succeeds.
    pub fn set_email_enabled(&mut self, enabled: bool) -> Result<(), SentryError> {
        if enabled && self.mailer.is_none() {
            return Err(SentryError::EmailUnavailable);
        }
        self.email_enabled = enabled;
        Ok(())
    }

    /// Clears the audio timer so the first alert of a run fires immediately.
    pub fn reset_audio_timer(&mut self) {
        self.audio.reset();
    }

    pub fn last_audio_alert(&self) -> Option<Instant> {
        self.audio.last_fired()
    }

    pub fn last_email(&self) -> Option<Instant> {
        self.email.last_fired()
    }

    pub fn evaluate(&mut self, verdict: &MotionVerdict, frame: &Frame, now: Instant) -> AlertOutcome {
        let mut outcome = AlertOutcome::default();
        if !verdict.is_motion {
            return outcome;
        }

        if self.audio.ready(now) {
            info!("Motion detected at {}", Local::now().format("%I:%M:%S%p"));
            if let Some(sound) = &self.sound {
                if let Err(err) = sound.play() {
                    warn!("alert sound failed: {err:#}");
                }
            }
            self.audio.mark(now);
            outcome.audio_fired = true;
        }

        if self.email_enabled && self.email.ready(now) {
            if let Some(mailer) = &self.mailer {
                self.email.mark(now);
                let alert = EmailAlert {
                    snapshot: frame.clone(),
                    detected_at: Local::now(),
                };
                if let Err(err) = mailer.dispatch(alert) {
                    warn!("email alert could not be queued: {err:#}");
                }
                outcome.email_fired = true;
            }
        }

        outcome
    }
}
