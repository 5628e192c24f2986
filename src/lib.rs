// THEORY:
// This file is the main entry point for the `motion_sentry` library crate.
// It exposes a real-time motion detector together with everything needed to
// act on its verdicts: rate-limited alerts, recording sessions and a
// run/stop controller that drives it all on a dedicated processing task.
//
// Key architectural principles:
// 1.  **Pure core**: the detector (`pipeline` over `core_modules`) is plain
//     image processing with no devices attached, so it can be fed from a
//     camera, a file or a test.
// 2.  **Devices at the edge**: cameras, video writers, speakers and mail
//     relays are reached through small traits (`camera`, `recording`,
//     `alerts`). The library ships the SMTP mailer and, behind the `audio`
//     feature, a rodio player; camera and video writer drivers live in the
//     `sentry_console` binary.
// 3.  **Shell-agnostic control**: `processing::DetectionController` is the
//     complete command surface. A presentation layer only issues commands and
//     reads the `FrameBus`.

pub mod alerts;
pub mod camera;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod processing;
pub mod recording;

pub use config::{DetectionParams, EmailConfig, SentryConfig};
pub use error::SentryError;
pub use processing::{DetectionController, Devices, Status};
