// THEORY:
// Email alerts carry a JPEG snapshot of the annotated frame. Building and
// sending happen off the processing loop: `SmtpMailer` owns a worker thread
// fed through a channel, and `dispatch` only enqueues.
//
// Each send opens a fresh STARTTLS session, authenticates, delivers one
// message and disconnects. Failures are logged by the worker; the caller has
// already stamped its cooldown and never learns about them.

use crate::config::EmailConfig;
use crate::core_modules::frame::Frame;
use crate::error::ConfigError;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::{error, info};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

pub const SNAPSHOT_NAME: &str = "motion.jpg";
const JPEG_QUALITY: u8 = 90;
const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One snapshot to be mailed.
#[derive(Debug, Clone)]
pub struct EmailAlert {
    pub snapshot: Frame,
    pub detected_at: DateTime<Local>,
}

pub trait AlertMailer: Send {
    /// Hands the alert over for delivery. Must not block on the network.
    fn dispatch(&self, alert: EmailAlert) -> anyhow::Result<()>;
}

pub fn encode_jpeg(frame: &Frame) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(frame)
        .context("failed to encode snapshot")?;
    Ok(out)
}

pub fn build_message(config: &EmailConfig, alert: &EmailAlert, jpeg: Vec<u8>) -> anyhow::Result<Message> {
    let stamp = alert.detected_at.format(STAMP_FORMAT);
    let image_type = ContentType::parse("image/jpeg").map_err(|err| anyhow!("{err}"))?;
    Message::builder()
        .from(config.sender()?)
        .to(config.recipient_mailbox()?)
        .subject(format!("Motion Detected - {stamp}"))
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(format!("Motion was detected at {stamp}")))
                .singlepart(Attachment::new(SNAPSHOT_NAME.to_string()).body(jpeg, image_type)),
        )
        .context("failed to assemble alert email")
}

fn send_alert(config: &EmailConfig, alert: &EmailAlert) -> anyhow::Result<()> {
    let jpeg = encode_jpeg(&alert.snapshot)?;
    let message = build_message(config, alert, jpeg)?;
    let transport = SmtpTransport::starttls_relay(&config.smtp_server)
        .with_context(|| format!("invalid relay {}", config.smtp_server))?
        .port(config.smtp_port)
        .credentials(Credentials::new(config.username.clone(), config.password.clone()))
        .timeout(Some(SEND_TIMEOUT))
        .build();
    transport.send(&message).context("SMTP delivery failed")?;
    Ok(())
}

/// Mailer backed by an SMTP relay and a background worker thread.
pub struct SmtpMailer {
    tx: Sender<EmailAlert>,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel::<EmailAlert>();
        let spawned = thread::Builder::new().name("alert-mailer".into()).spawn(move || {
            for alert in rx {
                match send_alert(&config, &alert) {
                    Ok(()) => info!("Email alert sent to {}", config.recipient),
                    Err(err) => error!("Failed to send email: {err:#}"),
                }
            }
        });
        if let Err(err) = spawned {
            // Without a worker every dispatch will fail and be logged.
            error!("could not start mail worker: {err}");
        }
        Ok(Self { tx })
    }
}

impl AlertMailer for SmtpMailer {
    fn dispatch(&self, alert: EmailAlert) -> anyhow::Result<()> {
        self.tx.send(alert).map_err(|_| anyhow!("mail worker has stopped"))
    }
}
