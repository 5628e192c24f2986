// THEORY:
// The camera is an external device, so the library only describes the
// contract it needs and leaves the driver to the binary (OpenCV) or to tests
// (in-memory frame lists).
//
// - `CameraOpener` is held by the controller and called on every start.
// - `FrameSource` is the open handle. It is owned by the processing loop for
//   the duration of a run and must tolerate `close()` being called twice.
//
// A failed `read()` is never retried here: the loop treats it as the end of
// the run.

use crate::core_modules::frame::Frame;
use crate::error::CameraError;

pub trait FrameSource: Send {
    /// Blocks until the next frame is available.
    fn read(&mut self) -> Result<Frame, CameraError>;

    /// Native resolution as (width, height).
    fn frame_size(&self) -> (u32, u32);

    /// Releases the device. Idempotent.
    fn close(&mut self);
}

pub trait CameraOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

impl<F> CameraOpener for F
where
    F: Fn() -> Result<Box<dyn FrameSource>, CameraError> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        self()
    }
}
