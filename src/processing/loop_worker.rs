use crate::core_modules::frame::Frame;
use crate::error::CameraError;
use crate::pipeline::DetectionPipeline;
use crate::processing::controller::{lock, release, CameraSlot, RunState, Shared};
use crate::processing::publish::{Notice, PublishedFrame, Status};
use chrono::Local;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Body of the dedicated processing task. Returns when cancelled or when the
/// camera stops delivering frames.
pub(crate) fn run_detection_loop(shared: Arc<Shared>, camera: CameraSlot, cancel: CancellationToken) {
    let mut pipeline = DetectionPipeline::new(&shared.params.snapshot());
    let mut cycles: u64 = 0;
    debug!("processing loop started");

    while !cancel.is_cancelled() {
        let frame = match read_frame(&camera) {
            Ok(frame) => frame,
            Err(err) => {
                if cancel.is_cancelled() {
                    break;
                }
                error!("Failed to grab frame: {err}");
                shared.bus.notify(Notice::Error("Failed to grab frame.".into()));
                if shared.begin_stopping() {
                    shared.stop_recording();
                    release(&mut lock(&camera));
                    shared.finish_stopping(None);
                }
                break;
            }
        };

        process_cycle(&shared, &mut pipeline, frame, &cancel);
        cycles += 1;
        std::thread::sleep(shared.config.cycle_interval);
    }

    release(&mut lock(&camera));
    info!("processing loop exited after {cycles} cycles");
}

fn read_frame(camera: &CameraSlot) -> Result<Frame, CameraError> {
    match lock(camera).as_mut() {
        Some(source) => source.read(),
        None => Err(CameraError::Closed),
    }
}

fn process_cycle(shared: &Shared, pipeline: &mut DetectionPipeline, frame: Frame, cancel: &CancellationToken) {
    let params = shared.params.snapshot();
    // Some drivers report 0x0 until the first frame; trust what actually arrives.
    *lock(&shared.frame_size) = Some(frame.dimensions());

    let analysis = pipeline.analyze(&frame, &params);
    let captured_at = Local::now();
    let annotated = shared.painter.annotate(&frame, &analysis.verdict, captured_at);

    lock(&shared.alerts).evaluate(&analysis.verdict, &annotated, Instant::now());

    let annotated = Arc::new(annotated);
    {
        // Publishing under the run-state lock keeps a late cycle from
        // overwriting the "Stopped" status of a finished run.
        let state = lock(&shared.run_state);
        if *state != RunState::Running || cancel.is_cancelled() {
            return;
        }
        let recording = lock(&shared.recording);
        shared.bus.publish_frame(PublishedFrame {
            frame: Arc::clone(&annotated),
            is_motion: analysis.verdict.is_motion,
            region_count: analysis.verdict.regions.len(),
            captured_at,
        });
        shared.bus.set_status(if recording.is_some() { Status::Recording } else { Status::Running });
    }

    if let Some(session) = lock(&shared.recording).as_mut() {
        session.append(&annotated);
    }
}
