// THEORY:
// The `FrameBus` is the only thing the presentation shell and the processing
// loop share besides the tuning knobs. It has three lanes:
//
// 1.  **frame**: a single slot holding the latest annotated frame. A watch
//     channel, so a slow reader only ever sees the newest value and the loop
//     never waits for anybody.
// 2.  **status**: one of the four status strings, also a watch slot.
// 3.  **notices**: one-off user-facing messages (recording saved, camera
//     failed, ...). A bounded broadcast channel; a reader that lags simply
//     loses the oldest notices.

use crate::core_modules::frame::Frame;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

const DEFAULT_NOTICE_CAPACITY: usize = 32;

/// The annotated frame of one cycle.
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    pub frame: Arc<Frame>,
    pub is_motion: bool,
    pub region_count: usize,
    pub captured_at: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotRunning,
    Running,
    Stopped,
    Recording,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::NotRunning => "Not Running",
            Status::Running => "Running",
            Status::Stopped => "Stopped",
            Status::Recording => "Recording",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RecordingStarted(PathBuf),
    RecordingSaved(PathBuf),
    Warning(String),
    Error(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RecordingStarted(path) => write!(f, "Recording to {}", path.display()),
            Notice::RecordingSaved(path) => write!(f, "Recording saved to {}", path.display()),
            Notice::Warning(text) | Notice::Error(text) => f.write_str(text),
        }
    }
}

#[derive(Clone)]
pub struct FrameBus {
    frame_tx: Arc<watch::Sender<Option<PublishedFrame>>>,
    status_tx: Arc<watch::Sender<Status>>,
    notice_tx: broadcast::Sender<Notice>,
}

impl Default for FrameBus {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_CAPACITY)
    }
}

impl FrameBus {
    pub fn new(notice_capacity: usize) -> Self {
        let (frame_tx, _) = watch::channel::<Option<PublishedFrame>>(None);
        let (status_tx, _) = watch::channel(Status::NotRunning);
        let (notice_tx, _) = broadcast::channel::<Notice>(notice_capacity.max(1));
        Self {
            frame_tx: Arc::new(frame_tx),
            status_tx: Arc::new(status_tx),
            notice_tx,
        }
    }

    pub fn publish_frame(&self, frame: PublishedFrame) {
        self.frame_tx.send_replace(Some(frame));
    }

    pub fn clear_frame(&self) {
        self.frame_tx.send_replace(None);
    }

    pub fn latest_frame(&self) -> Option<PublishedFrame> {
        self.frame_tx.borrow().clone()
    }

    pub fn set_status(&self, status: Status) {
        self.status_tx.send_replace(status);
    }

    pub fn status(&self) -> Status {
        *self.status_tx.borrow()
    }

    /// Sends a notice to whoever is listening; nobody listening is fine.
    pub fn notify(&self, notice: Notice) {
        let _ = self.notice_tx.send(notice);
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        let shown: Vec<String> = [Status::NotRunning, Status::Running, Status::Stopped, Status::Recording]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(shown, ["Not Running", "Running", "Stopped", "Recording"]);
    }

    #[test]
    fn frame_slot_keeps_only_the_latest() {
        let bus = FrameBus::default();
        assert!(bus.latest_frame().is_none());
        for n in 1..=3u8 {
            bus.publish_frame(PublishedFrame {
                frame: Arc::new(Frame::from_pixel(2, 2, image::Rgb([n, n, n]))),
                is_motion: n == 3,
                region_count: n as usize,
                captured_at: Local::now(),
            });
        }
        let latest = bus.latest_frame().unwrap();
        assert!(latest.is_motion);
        assert_eq!(latest.frame.get_pixel(0, 0).0, [3, 3, 3]);
        bus.clear_frame();
        assert!(bus.latest_frame().is_none());
    }

    #[test]
    fn notices_reach_subscribers() {
        let bus = FrameBus::default();
        bus.notify(Notice::Warning("nobody hears this".into()));
        let mut rx = bus.subscribe_notices();
        bus.notify(Notice::RecordingSaved(PathBuf::from("recordings/motion_1.avi")));
        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.to_string(), "Recording saved to recordings/motion_1.avi");
        assert!(rx.try_recv().is_err());
    }
}
