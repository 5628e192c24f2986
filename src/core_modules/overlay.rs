// THEORY:
// The overlay stage turns a raw frame plus its verdict into the picture a
// human sees (and the picture that gets recorded and emailed). It never
// mutates the captured frame; it works on a copy.
//
// What is drawn:
// - a green box (2px) around every surviving motion region,
// - a red status line in the top-left corner,
// - a red timestamp along the bottom edge.
//
// Text needs a TrueType font. When none is configured the painter falls back
// to a small coloured status square (red = motion, green = quiet) so the
// recording still carries the verdict.

use crate::core_modules::frame::{Frame, MotionVerdict};
use ab_glyph::{FontVec, PxScale};
use chrono::{DateTime, Local};
use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use log::warn;
use std::path::Path;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const STATUS_SCALE: f32 = 16.0;
const TIMESTAMP_SCALE: f32 = 11.0;
const MARGIN: i32 = 10;
const INDICATOR_SIZE: u32 = 12;

pub const TIMESTAMP_FORMAT: &str = "%A %d %B %Y %I:%M:%S%p";

pub fn status_line(verdict: &MotionVerdict) -> &'static str {
    if verdict.is_motion {
        "Status: Motion Detected"
    } else {
        "Status: No Motion"
    }
}

pub struct OverlayPainter {
    font: Option<FontVec>,
}

impl OverlayPainter {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    /// Loads the overlay font; a missing or unreadable font downgrades to the
    /// indicator square.
    pub fn from_font_file(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            warn!("no overlay font configured, status text will be replaced by an indicator");
            return Self::new(None);
        };
        let font = std::fs::read(path)
            .map_err(|err| err.to_string())
            .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|err| err.to_string()));
        match font {
            Ok(font) => Self::new(Some(font)),
            Err(err) => {
                warn!("could not load overlay font {}: {err}", path.display());
                Self::new(None)
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, frame: &Frame, verdict: &MotionVerdict, now: DateTime<Local>) -> Frame {
        let mut canvas = frame.clone();

        for bbox in verdict.bounding_boxes() {
            draw_hollow_rect_mut(&mut canvas, bbox.to_rect(), BOX_COLOR);
            if bbox.width > 2 && bbox.height > 2 {
                let inner = Rect::at(bbox.x as i32 + 1, bbox.y as i32 + 1).of_size(bbox.width - 2, bbox.height - 2);
                draw_hollow_rect_mut(&mut canvas, inner, BOX_COLOR);
            }
        }

        match &self.font {
            Some(font) => {
                draw_text_mut(
                    &mut canvas,
                    TEXT_COLOR,
                    MARGIN,
                    MARGIN / 2,
                    PxScale::from(STATUS_SCALE),
                    font,
                    status_line(verdict),
                );
                let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
                let y = canvas.height() as i32 - MARGIN - TIMESTAMP_SCALE as i32;
                draw_text_mut(
                    &mut canvas,
                    TEXT_COLOR,
                    MARGIN,
                    y.max(0),
                    PxScale::from(TIMESTAMP_SCALE),
                    font,
                    &timestamp,
                );
            }
            None => {
                let color = if verdict.is_motion { TEXT_COLOR } else { BOX_COLOR };
                let indicator = Rect::at(MARGIN, MARGIN / 2).of_size(INDICATOR_SIZE, INDICATOR_SIZE);
                draw_filled_rect_mut(&mut canvas, indicator, color);
            }
        }

        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::{BoundingBox, MotionRegion};

    fn verdict_with(bbox: BoundingBox) -> MotionVerdict {
        MotionVerdict::from_regions(vec![MotionRegion { bounding_box: bbox, area: 100.0, outline: Vec::new() }])
    }

    #[test]
    fn boxes_are_drawn_two_pixels_wide_on_a_copy() {
        let frame = Frame::new(80, 60);
        let painter = OverlayPainter::new(None);
        let verdict = verdict_with(BoundingBox { x: 30, y: 20, width: 20, height: 20 });

        let out = painter.annotate(&frame, &verdict, Local::now());
        assert_eq!(*out.get_pixel(30, 30), BOX_COLOR);
        assert_eq!(*out.get_pixel(31, 30), BOX_COLOR);
        assert_eq!(*out.get_pixel(32, 30), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(49, 39), BOX_COLOR);
        assert_eq!(*frame.get_pixel(30, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn indicator_reflects_verdict_without_font() {
        let frame = Frame::new(80, 60);
        let painter = OverlayPainter::new(None);
        assert!(!painter.has_font());

        let quiet = painter.annotate(&frame, &MotionVerdict::default(), Local::now());
        assert_eq!(*quiet.get_pixel(12, 8), BOX_COLOR);

        let busy = painter.annotate(&frame, &verdict_with(BoundingBox { x: 40, y: 30, width: 5, height: 5 }), Local::now());
        assert_eq!(*busy.get_pixel(12, 8), TEXT_COLOR);
    }

    #[test]
    fn missing_font_file_degrades() {
        let painter = OverlayPainter::from_font_file(Some(Path::new("/nonexistent/font.ttf")));
        assert!(!painter.has_font());
    }

    #[test]
    fn status_line_text() {
        assert_eq!(status_line(&MotionVerdict::default()), "Status: No Motion");
    }
}
