// THEORY:
// OpenCV speaks BGR `Mat`s; the library speaks RGB `image` buffers. This file
// is the only place the two meet.
//
// - `OpenCvCamera` wraps a `VideoCapture` on a device index and converts every
//   frame to RGB.
// - `OpenCvSinkFactory` opens an XVID/AVI `VideoWriter` per recording session
//   and converts every annotated frame back to BGR before writing.

use motion_sentry::camera::{CameraOpener, FrameSource};
use motion_sentry::error::{CameraError, RecordingError};
use motion_sentry::pipeline::Frame;
use motion_sentry::recording::{SinkFactory, VideoSink};
use opencv::{
    core::{self, Mat, Scalar},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::{Path, PathBuf};

fn capture_error(err: opencv::Error) -> CameraError {
    CameraError::Capture(err.to_string())
}

pub struct OpenCvCamera {
    cap: VideoCapture,
    width: u32,
    height: u32,
    bgr: Mat,
    rgb: Mat,
}

impl OpenCvCamera {
    pub fn open(index: i32) -> Result<Self, CameraError> {
        let open_error = |reason: String| CameraError::Open { index, reason };
        let cap = VideoCapture::new(index, videoio::CAP_ANY).map_err(|err| open_error(err.to_string()))?;
        if !cap.is_opened().map_err(|err| open_error(err.to_string()))? {
            return Err(open_error("device did not open".into()));
        }
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;
        Ok(Self {
            cap,
            width,
            height,
            bgr: Mat::default(),
            rgb: Mat::default(),
        })
    }
}

impl FrameSource for OpenCvCamera {
    fn read(&mut self) -> Result<Frame, CameraError> {
        if !self.cap.is_opened().map_err(capture_error)? {
            return Err(CameraError::Closed);
        }
        if !self.cap.read(&mut self.bgr).map_err(capture_error)? || self.bgr.empty() {
            return Err(CameraError::EndOfStream);
        }
        imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0).map_err(capture_error)?;

        let (width, height) = (self.rgb.cols() as u32, self.rgb.rows() as u32);
        let bytes = self.rgb.data_bytes().map_err(capture_error)?.to_vec();
        self.width = width;
        self.height = height;
        Frame::from_raw(width, height, bytes)
            .ok_or_else(|| CameraError::Capture(format!("unexpected buffer size for {width}x{height}")))
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn close(&mut self) {
        if let Err(err) = self.cap.release() {
            log::warn!("camera release failed: {err}");
        }
    }
}

pub struct OpenCvCameraOpener {
    index: i32,
}

impl OpenCvCameraOpener {
    pub fn new(index: i32) -> Self {
        Self { index }
    }
}

impl CameraOpener for OpenCvCameraOpener {
    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        Ok(Box::new(OpenCvCamera::open(self.index)?))
    }
}

struct OpenCvSink {
    path: PathBuf,
    writer: VideoWriter,
    rgb: Mat,
    bgr: Mat,
}

impl OpenCvSink {
    fn writer_error(&self, err: opencv::Error) -> RecordingError {
        RecordingError::Writer {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}

impl VideoSink for OpenCvSink {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        let (cols, rows) = (self.rgb.cols() as u32, self.rgb.rows() as u32);
        if frame.dimensions() != (cols, rows) {
            return Err(RecordingError::Writer {
                path: self.path.clone(),
                reason: format!("frame is {}x{}, writer expects {cols}x{rows}", frame.width(), frame.height()),
            });
        }
        let copied = self.rgb.data_bytes_mut().map(|dst| dst.copy_from_slice(frame.as_raw()));
        copied.map_err(|err| self.writer_error(err))?;
        imgproc::cvt_color(&self.rgb, &mut self.bgr, imgproc::COLOR_RGB2BGR, 0).map_err(|err| self.writer_error(err))?;
        self.writer.write(&self.bgr).map_err(|err| self.writer_error(err))
    }

    fn finish(&mut self) -> Result<(), RecordingError> {
        self.writer.release().map_err(|err| self.writer_error(err))
    }
}

/// Writes XVID-encoded AVI files.
pub struct OpenCvSinkFactory;

impl SinkFactory for OpenCvSinkFactory {
    fn open(&self, path: &Path, width: u32, height: u32, fps: f64) -> Result<Box<dyn VideoSink>, RecordingError> {
        let fail = |reason: String| RecordingError::Writer {
            path: path.to_path_buf(),
            reason,
        };
        if width == 0 || height == 0 {
            return Err(fail("frame size is not known yet".into()));
        }
        let filename = path.to_str().ok_or_else(|| fail("path is not valid UTF-8".into()))?;
        let fourcc = VideoWriter::fourcc('X', 'V', 'I', 'D').map_err(|err| fail(err.to_string()))?;
        let size = core::Size::new(width as i32, height as i32);
        let writer = VideoWriter::new(filename, fourcc, fps, size, true).map_err(|err| fail(err.to_string()))?;
        if !writer.is_opened().map_err(|err| fail(err.to_string()))? {
            return Err(fail("video writer did not open".into()));
        }
        let rgb = Mat::new_rows_cols_with_default(height as i32, width as i32, core::CV_8UC3, Scalar::all(0.0))
            .map_err(|err| fail(err.to_string()))?;
        Ok(Box::new(OpenCvSink {
            path: path.to_path_buf(),
            writer,
            rgb,
            bgr: Mat::default(),
        }))
    }

    fn container_extension(&self) -> &str {
        "avi"
    }
}
