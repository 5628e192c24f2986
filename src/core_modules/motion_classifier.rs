// THEORY:
// The motion classifier is the spatial layer of the detector. It takes the raw
// foreground mask from the `BackgroundModel` and decides which parts of it are
// real, coherent moving objects.
//
// Algorithm steps (the order matters, each step feeds the next):
// 1.  **Blur**: a 5x5 binomial (Gaussian) kernel suppresses single-pixel
//     speckle. Doing this before thresholding avoids false edges from noise.
// 2.  **Binarize**: pixels brighter than the threshold become 255, the rest 0.
//     With the default threshold (200) the shadow value (127) is discarded.
// 3.  **Dilate**: two 3x3 dilations merge the fragments of one moving
//     silhouette into a single blob, before it can be split into several small
//     contours that would each fail the area filter.
// 4.  **External Contours**: only outer boundaries of top-level blobs are kept;
//     holes and blobs nested inside holes are ignored. Each boundary is
//     compressed to its corner points.
// 5.  **Area Filter**: contours enclosing less than `min_area` are dropped.
// 6.  **Bounding Boxes**: each survivor yields an axis-aligned box, and the
//     verdict is "motion" iff at least one survives.
//
// The classifier is stateless: a mask goes in, a verdict comes out. All
// memory of previous frames lives in the background model.

use crate::core_modules::frame::{BoundingBox, Mask, MotionRegion, MotionVerdict};

pub mod motion_classifier {
    use super::*;
    use image::Luma;
    use imageproc::contours::{find_contours, BorderType};
    use imageproc::distance_transform::Norm;
    use imageproc::filter::separable_filter_equal;
    use imageproc::morphology::dilate;

    /// 5-tap binomial kernel, the 5x5 Gaussian with sigma derived from the size.
    pub const BLUR_KERNEL: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];
    /// Each iteration is one 3x3 dilation; two iterations equal one 5x5 pass.
    pub const DILATE_ITERATIONS: u8 = 2;
    pub const MAX_VALUE: u8 = 255;

    /// Runs the full mask-to-verdict chain.
    pub fn classify(mask: &Mask, threshold: u8, min_area: u32) -> MotionVerdict {
        let binary = clean_mask(mask, threshold);
        let regions = external_regions(&binary)
            .into_iter()
            .filter(|region| region.area >= min_area as f64)
            .collect();
        MotionVerdict::from_regions(regions)
    }

    /// Blur, binarize and dilate.
    pub fn clean_mask(mask: &Mask, threshold: u8) -> Mask {
        let blurred = blur(mask);
        let binary = binarize(&blurred, threshold);
        dilate(&binary, Norm::LInf, DILATE_ITERATIONS)
    }

    pub fn blur(mask: &Mask) -> Mask {
        separable_filter_equal(mask, &BLUR_KERNEL)
    }

    /// Strictly-greater comparison, matching a classic binary threshold.
    pub fn binarize(mask: &Mask, threshold: u8) -> Mask {
        let mut binary = mask.clone();
        for pixel in binary.pixels_mut() {
            *pixel = Luma([if pixel[0] > threshold { MAX_VALUE } else { 0 }]);
        }
        binary
    }

    /// Outer boundaries of the top-level blobs in a binary mask, unfiltered.
    ///
    /// The border follower only opens an outer border at `x > 0`, so a blob
    /// touching column 0 would come back as an orphan hole. Tracing on a
    /// canvas with one pixel of background on every side makes the area
    /// outside the frame count as background.
    pub fn external_regions(binary: &Mask) -> Vec<MotionRegion> {
        let padded = pad_with_background(binary);
        find_contours::<i32>(&padded)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .filter_map(|contour| {
                let points: Vec<(i32, i32)> = contour.points.iter().map(|p| (p.x - 1, p.y - 1)).collect();
                region_from_boundary(&points)
            })
            .collect()
    }

    fn pad_with_background(binary: &Mask) -> Mask {
        let mut padded = Mask::new(binary.width() + 2, binary.height() + 2);
        image::imageops::replace(&mut padded, binary, 1, 1);
        padded
    }

    fn region_from_boundary(points: &[(i32, i32)]) -> Option<MotionRegion> {
        let outline = simplify_chain(points);
        let bounding_box = bounding_box(&outline)?;
        Some(MotionRegion {
            area: polygon_area(&outline),
            bounding_box,
            outline,
        })
    }

    /// Keeps only the points where the boundary changes direction.
    pub fn simplify_chain(points: &[(i32, i32)]) -> Vec<(i32, i32)> {
        let n = points.len();
        if n < 3 {
            return points.to_vec();
        }
        (0..n)
            .filter(|&i| {
                let prev = points[(i + n - 1) % n];
                let here = points[i];
                let next = points[(i + 1) % n];
                (here.0 - prev.0, here.1 - prev.1) != (next.0 - here.0, next.1 - here.1)
            })
            .map(|i| points[i])
            .collect()
    }

    /// Shoelace formula over a closed polyline.
    pub fn polygon_area(points: &[(i32, i32)]) -> f64 {
        let n = points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: i64 = (0..n)
            .map(|i| {
                let (x0, y0) = points[i];
                let (x1, y1) = points[(i + 1) % n];
                x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64
            })
            .sum();
        twice.abs() as f64 / 2.0
    }

    pub fn bounding_box(points: &[(i32, i32)]) -> Option<BoundingBox> {
        let min_x = points.iter().map(|p| p.0).min()?;
        let max_x = points.iter().map(|p| p.0).max()?;
        let min_y = points.iter().map(|p| p.1).min()?;
        let max_y = points.iter().map(|p| p.1).max()?;
        Some(BoundingBox {
            x: min_x.max(0) as u32,
            y: min_y.max(0) as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::motion_classifier::*;
    use super::*;
    use image::Luma;

    fn fill(mask: &mut Mask, x: u32, y: u32, w: u32, h: u32, value: u8) {
        for yy in y..y + h {
            for xx in x..x + w {
                mask.put_pixel(xx, yy, Luma([value]));
            }
        }
    }

    #[test]
    fn empty_mask_has_no_motion() {
        let verdict = classify(&Mask::new(64, 48), 200, 500);
        assert!(!verdict.is_motion);
        assert!(verdict.regions.is_empty());
    }

    #[test]
    fn solid_square_becomes_one_region() {
        let mut mask = Mask::new(160, 120);
        fill(&mut mask, 40, 30, 50, 50, 255);

        let verdict = classify(&mask, 200, 500);
        assert!(verdict.is_motion);
        assert_eq!(verdict.regions.len(), 1);

        let region = &verdict.regions[0];
        // Threshold erodes one pixel per side, dilation grows two.
        assert_eq!(region.bounding_box, BoundingBox { x: 39, y: 29, width: 52, height: 52 });
        assert_eq!(region.area, 2601.0);
        assert_eq!(region.outline.len(), 4);
    }

    #[test]
    fn isolated_speckle_is_blurred_away() {
        let mut mask = Mask::new(32, 32);
        fill(&mut mask, 10, 10, 3, 3, 255);
        let verdict = classify(&mask, 200, 1);
        assert!(!verdict.is_motion);
    }

    #[test]
    fn shadow_pixels_fall_below_default_threshold() {
        let mut mask = Mask::new(100, 100);
        fill(&mut mask, 20, 20, 40, 40, 127);
        assert!(!classify(&mask, 200, 100).is_motion);
        assert!(classify(&mask, 100, 100).is_motion);
    }

    #[test]
    fn area_filter_is_monotonic() {
        let mut mask = Mask::new(200, 80);
        fill(&mut mask, 10, 10, 12, 12, 255);
        fill(&mut mask, 60, 10, 20, 20, 255);
        fill(&mut mask, 120, 10, 30, 30, 255);

        let areas = [0u32, 100, 170, 400, 442, 900, 962, 2000];
        for pair in areas.windows(2) {
            let loose = classify(&mask, 200, pair[0]);
            let strict = classify(&mask, 200, pair[1]);
            for region in &strict.regions {
                assert!(loose.regions.contains(region));
            }
            assert!(strict.regions.len() <= loose.regions.len());
        }

        assert_eq!(classify(&mask, 200, 100).regions.len(), 3);
        assert_eq!(classify(&mask, 200, 442).regions.len(), 1);
        assert!(!classify(&mask, 200, 2000).is_motion);
    }

    #[test]
    fn separate_blobs_are_reported_in_raster_order() {
        let mut mask = Mask::new(120, 120);
        fill(&mut mask, 60, 70, 30, 30, 255);
        fill(&mut mask, 10, 10, 30, 30, 255);

        let verdict = classify(&mask, 200, 500);
        assert_eq!(verdict.regions.len(), 2);
        assert!(verdict.regions[0].bounding_box.y < verdict.regions[1].bounding_box.y);
    }

    #[test]
    fn blobs_nested_in_holes_are_not_external() {
        let mut mask = Mask::new(120, 120);
        fill(&mut mask, 10, 10, 80, 80, 255);
        fill(&mut mask, 30, 30, 40, 40, 0);
        fill(&mut mask, 45, 45, 10, 10, 255);

        let verdict = classify(&mask, 200, 10);
        assert_eq!(verdict.regions.len(), 1);
        assert_eq!(verdict.regions[0].bounding_box.x, 9);
    }

    #[test]
    fn blobs_touching_the_left_edge_are_found() {
        for x in [0, 1] {
            let mut mask = Mask::new(100, 100);
            fill(&mut mask, x, 30, 40, 40, 255);

            let verdict = classify(&mask, 200, 500);
            assert!(verdict.is_motion, "blob at x={x} missed");
            assert_eq!(verdict.regions.len(), 1);
            let bbox = verdict.regions[0].bounding_box;
            assert_eq!(bbox.x, 0);
            assert!(bbox.width >= 39 && bbox.width <= 43, "width {}", bbox.width);
            assert!(verdict.regions[0].area >= 1400.0);
        }
    }

    #[test]
    fn blobs_on_every_border_are_found() {
        let corners = [(0, 0), (60, 0), (0, 60), (60, 60), (30, 0), (0, 30)];
        for (x, y) in corners {
            let mut mask = Mask::new(100, 100);
            fill(&mut mask, x, y, 40, 40, 255);
            let verdict = classify(&mask, 200, 500);
            assert_eq!(verdict.regions.len(), 1, "blob at ({x}, {y})");
            let bbox = verdict.regions[0].bounding_box;
            assert!(bbox.x + bbox.width <= 100 && bbox.y + bbox.height <= 100);
        }
    }

    #[test]
    fn fully_foreground_mask_is_one_region() {
        let mut mask = Mask::new(60, 60);
        fill(&mut mask, 0, 0, 60, 60, 255);
        let verdict = classify(&mask, 200, 500);
        assert_eq!(verdict.regions.len(), 1);
        assert_eq!(verdict.regions[0].bounding_box, BoundingBox { x: 0, y: 0, width: 60, height: 60 });
    }

    #[test]
    fn chain_simplification_keeps_corners() {
        let square: Vec<(i32, i32)> = vec![
            (0, 0), (1, 0), (2, 0), (2, 1), (2, 2), (1, 2), (0, 2), (0, 1),
        ];
        let simplified = simplify_chain(&square);
        assert_eq!(simplified, vec![(0, 0), (2, 0), (2, 2), (0, 2)]);
        assert_eq!(polygon_area(&simplified), 4.0);
        assert_eq!(polygon_area(&square), 4.0);
    }
}
