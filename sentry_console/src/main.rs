mod opencv_io;
mod shell;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use motion_sentry::alerts::email::SmtpMailer;
use motion_sentry::alerts::sound::{RodioAlertSound, SoundAsset};
use motion_sentry::alerts::{AlertMailer, AlertSound};
use motion_sentry::config::{DetectionParams, EmailConfig, SentryConfig};
use motion_sentry::processing::{DetectionController, Devices, Notice};
use opencv_io::{OpenCvCameraOpener, OpenCvSinkFactory};
use shell::{parse_command, Command, HELP};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(author, version, about = "Watch a camera for motion, raise alerts and record annotated video", long_about = None)]
struct Args {
    /// Camera device index
    #[arg(short, long, env = "SENTRY_CAMERA_INDEX", default_value_t = 0)]
    camera: i32,

    /// Directory holding alert.wav and the recordings/ folder (default: next to the executable)
    #[arg(long, env = "SENTRY_INSTALL_DIR")]
    install_dir: Option<PathBuf>,

    /// TrueType font used for the status text overlay
    #[arg(long, env = "SENTRY_OVERLAY_FONT")]
    font: Option<PathBuf>,

    /// Background history length (higher adapts more slowly)
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u32).range(100..=1000))]
    sensitivity: u32,

    /// Minimum contour area counted as motion
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u32).range(100..=2000))]
    min_area: u32,

    /// Binarization threshold for the foreground mask
    #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u8).range(50..=250))]
    threshold: u8,

    #[arg(long, env = "SENTRY_SMTP_SERVER")]
    smtp_server: Option<String>,

    #[arg(long, env = "SENTRY_SMTP_PORT", default_value_t = EmailConfig::DEFAULT_PORT)]
    smtp_port: u16,

    #[arg(long, env = "SENTRY_SMTP_USERNAME")]
    smtp_username: Option<String>,

    #[arg(long, env = "SENTRY_SMTP_PASSWORD", hide_env_values = true)]
    smtp_password: Option<String>,

    #[arg(long, env = "SENTRY_ALERT_RECIPIENT")]
    alert_recipient: Option<String>,

    /// Start detection immediately
    #[arg(long)]
    autostart: bool,
}

impl Args {
    fn email_config(&self) -> Option<EmailConfig> {
        match (&self.smtp_server, &self.smtp_username, &self.smtp_password, &self.alert_recipient) {
            (Some(server), Some(username), Some(password), Some(recipient)) => Some(EmailConfig {
                smtp_server: server.clone(),
                smtp_port: self.smtp_port,
                username: username.clone(),
                password: password.clone(),
                recipient: recipient.clone(),
            }),
            (None, None, None, None) => None,
            _ => {
                warn!("incomplete SMTP settings, email alerts are unavailable");
                None
            }
        }
    }

    fn sentry_config(&self) -> Result<SentryConfig> {
        let mut config = match &self.install_dir {
            Some(dir) => SentryConfig::for_install_dir(dir),
            None => SentryConfig::from_current_exe().context("could not locate the executable")?,
        };
        config.camera_index = self.camera;
        config.overlay_font = self.font.clone();
        config.initial_params = DetectionParams {
            sensitivity: self.sensitivity,
            min_area: self.min_area,
            threshold: self.threshold,
        };
        config.email = self.email_config();
        Ok(config)
    }
}

/// On failure returns the message for the user; alerts then stay silent.
fn load_sound(path: &Path) -> Result<Box<dyn AlertSound>, String> {
    let asset = SoundAsset::load(path).map_err(|err| {
        warn!("alert sound {} unavailable: {err}", path.display());
        format!(
            "Could not load sound file. Make sure 'alert.wav' exists at {}",
            path.display()
        )
    })?;
    match RodioAlertSound::spawn(asset) {
        Ok(sound) => Ok(Box::new(sound)),
        Err(err) => {
            warn!("audio output unavailable: {err:#}");
            Err(format!("Could not open audio output, alerts will be silent: {err}"))
        }
    }
}

fn load_mailer(config: Option<&EmailConfig>) -> Option<Box<dyn AlertMailer>> {
    let config = config?.clone();
    match SmtpMailer::new(config) {
        Ok(mailer) => Some(Box::new(mailer)),
        Err(err) => {
            warn!("email alerts unavailable: {err}");
            None
        }
    }
}

fn print_status(controller: &DetectionController) {
    let params = controller.params();
    println!(
        "Status: {} | sensitivity {} | min area {} | threshold {} | email {} | recording {}",
        controller.status(),
        params.sensitivity,
        params.min_area,
        params.threshold,
        if controller.email_enabled() { "on" } else { "off" },
        if controller.is_recording() { "yes" } else { "no" },
    );
}

fn save_snapshot(controller: &DetectionController, path: &Path) -> Result<()> {
    let published = controller
        .bus()
        .latest_frame()
        .context("no frame published yet, start detection first")?;
    published
        .frame
        .save(path)
        .with_context(|| format!("could not write {}", path.display()))?;
    println!("Snapshot saved to {}", path.display());
    Ok(())
}

fn report<T>(result: motion_sentry::error::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            println!("error: {err}");
            None
        }
    }
}

async fn execute(controller: &mut DetectionController, command: Command) -> bool {
    match command {
        Command::Start => {
            report(controller.start_detection().await);
        }
        Command::Stop => {
            report(controller.stop_detection().await);
        }
        Command::Record => {
            // Started/saved paths arrive through the notice printer.
            report(controller.toggle_recording());
        }
        Command::Email => {
            if let Some(enabled) = report(controller.toggle_email()) {
                println!("Email alerts {}", if enabled { "enabled" } else { "disabled" });
            }
        }
        Command::Sensitivity(value) => {
            report(controller.set_sensitivity(value));
        }
        Command::MinArea(value) => {
            report(controller.set_min_area(value));
        }
        Command::Threshold(value) => {
            report(controller.set_threshold(value));
        }
        Command::Status => print_status(controller),
        Command::Snapshot(path) => {
            if let Err(err) = save_snapshot(controller, &path) {
                println!("error: {err:#}");
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.sentry_config()?;

    let sound = load_sound(&config.alert_sound);
    let sound_warning = sound.as_ref().err().cloned();
    let devices = Devices {
        camera: Arc::new(OpenCvCameraOpener::new(config.camera_index)),
        recorder: Arc::new(OpenCvSinkFactory),
        sound: sound.ok(),
        mailer: load_mailer(config.email.as_ref()),
    };
    info!("recordings go to {}", config.recordings_dir.display());
    let mut controller = DetectionController::new(config, devices);

    let mut notices = controller.bus().subscribe_notices();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => println!("{notice}"),
                Err(RecvError::Lagged(skipped)) => warn!("{skipped} notices dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Some(message) = sound_warning {
        controller.bus().notify(Notice::Warning(message));
    }

    let mut status = controller.bus().subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            info!("status: {current}");
        }
    });

    println!("{HELP}");
    if args.autostart {
        report(controller.start_detection().await);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(command) => {
                if !execute(&mut controller, command).await {
                    break;
                }
            }
            Err(message) => println!("{message}"),
        }
    }

    controller.shutdown().await;
    info!("bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sound_asset_yields_a_user_warning() {
        let dir = std::env::temp_dir().join("sentry-console-no-such-dir");
        let path = dir.join("alert.wav");
        let message = match load_sound(&path) {
            Ok(_) => panic!("a missing asset must not load"),
            Err(message) => message,
        };
        assert!(message.starts_with("Could not load sound file."));
        assert!(message.contains(&path.display().to_string()));
    }
}
