// THEORY:
// The `BackgroundModel` is the temporal layer of the detector. It keeps, for
// every pixel, a small mixture of Gaussians describing the colours that pixel
// has shown recently, and uses that memory to decide whether the pixel's
// current colour is "scene" or "something new."
//
// Key architectural principles:
// 1.  **Per-Pixel Mixture**: Each pixel owns up to `MAX_MODES` Gaussian modes
//     (mean colour, one shared variance, weight). Modes are kept sorted by
//     weight; the strongest modes whose cumulative weight stays under the
//     background ratio describe the static scene.
// 2.  **Recursive Learning**: Every call updates the matched mode (or spawns a
//     new one) with learning rate `1 / min(2n, history)`. A long history means
//     slow adaptation, which is why the shell's "sensitivity" maps onto it.
//     Weak modes decay and are pruned, so a parked car eventually becomes
//     background.
// 3.  **Shadow Marking**: A foreground pixel that looks like a uniformly
//     darker copy of a background mode is reported as a shadow (127) instead
//     of solid foreground (255). The classifier's threshold then drops it.
// 4.  **Seeding**: A pixel with no modes yet is seeded from the current frame
//     and reported as background. A static scene therefore produces an empty
//     mask from the very first frame instead of one full-frame false alarm.

use crate::core_modules::frame::{Frame, Mask};
use image::Luma;

pub const MAX_MODES: usize = 5;
pub const DEFAULT_HISTORY: u32 = 500;

pub const BACKGROUND_VALUE: u8 = 0;
pub const SHADOW_VALUE: u8 = 127;
pub const FOREGROUND_VALUE: u8 = 255;

/// Tuning of the mixture model. The defaults are the classic MOG2 values with
/// the variance threshold used by the motion detector.
#[derive(Debug, Clone)]
pub struct MixtureSettings {
    /// Squared Mahalanobis distance under which a pixel is explained by a background mode.
    pub var_threshold: f32,
    /// Squared Mahalanobis distance under which a pixel updates an existing mode.
    pub var_threshold_gen: f32,
    /// Variance given to a freshly spawned mode.
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Portion of the total weight that counts as background.
    pub background_ratio: f32,
    /// Complexity reduction prior; modes lighter than `alpha * ct` are dropped.
    pub complexity_reduction: f32,
    pub detect_shadows: bool,
    /// Lower bound on the brightness ratio for a pixel to still count as shadow.
    pub shadow_ratio: f32,
}

impl Default for MixtureSettings {
    fn default() -> Self {
        Self {
            var_threshold: 25.0,
            var_threshold_gen: 9.0,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            background_ratio: 0.9,
            complexity_reduction: 0.05,
            detect_shadows: true,
            shadow_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Gaussian {
    weight: f32,
    variance: f32,
    mean: [f32; 3],
}

/// Adaptive per-pixel Gaussian mixture model of the static scene.
pub struct BackgroundModel {
    settings: MixtureSettings,
    /// Number of frames that contribute to the model.
    history: u32,
    /// Frames applied since the model was (re)initialised.
    frames_seen: u64,
    width: u32,
    height: u32,
    /// Active mode count per pixel.
    mode_counts: Vec<u8>,
    /// `MAX_MODES` slots per pixel, strongest first.
    modes: Vec<Gaussian>,
}

impl BackgroundModel {
    pub fn new(history: u32) -> Self {
        Self::with_settings(history, MixtureSettings::default())
    }

    pub fn with_settings(history: u32, settings: MixtureSettings) -> Self {
        Self {
            settings,
            history: history.max(1),
            frames_seen: 0,
            width: 0,
            height: 0,
            mode_counts: Vec::new(),
            modes: Vec::new(),
        }
    }

    pub fn history(&self) -> u32 {
        self.history
    }

    /// Changes the adaptation window without discarding what was learned.
    pub fn set_history(&mut self, history: u32) {
        self.history = history.max(1);
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Folds `frame` into the model and returns its foreground mask.
    pub fn apply(&mut self, frame: &Frame) -> Mask {
        let (width, height) = frame.dimensions();
        if width != self.width || height != self.height {
            self.reinitialise(width, height);
        }

        self.frames_seen += 1;
        let window = (2 * self.frames_seen).min(self.history as u64).max(1);
        let alpha = 1.0 / window as f32;

        let mut mask = Mask::new(width, height);
        for (index, (pixel, out)) in frame.pixels().zip(mask.pixels_mut()).enumerate() {
            let sample = [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32];
            let slots = &mut self.modes[index * MAX_MODES..(index + 1) * MAX_MODES];
            let count = &mut self.mode_counts[index];
            *out = Luma([update_pixel(slots, count, sample, alpha, &self.settings)]);
        }
        mask
    }

    fn reinitialise(&mut self, width: u32, height: u32) {
        let pixels = (width as usize) * (height as usize);
        self.width = width;
        self.height = height;
        self.frames_seen = 0;
        self.mode_counts = vec![0; pixels];
        self.modes = vec![Gaussian::default(); pixels * MAX_MODES];
    }
}

fn squared_distance(mean: &[f32; 3], sample: &[f32; 3]) -> f32 {
    mean.iter().zip(sample).map(|(m, s)| (m - s) * (m - s)).sum()
}

/// Updates one pixel's mixture and classifies the sample.
fn update_pixel(
    slots: &mut [Gaussian],
    count: &mut u8,
    sample: [f32; 3],
    alpha: f32,
    settings: &MixtureSettings,
) -> u8 {
    if *count == 0 {
        slots[0] = Gaussian {
            weight: 1.0,
            variance: settings.var_init,
            mean: sample,
        };
        *count = 1;
        return BACKGROUND_VALUE;
    }

    let prune_below = alpha * settings.complexity_reduction;
    let mut is_background = false;
    let mut fits = false;
    let mut cumulative = 0.0f32;

    for mode in slots[..*count as usize].iter_mut() {
        let mut weight = (1.0 - alpha) * mode.weight - prune_below;

        if !fits {
            let dist2 = squared_distance(&mode.mean, &sample);
            if cumulative < settings.background_ratio && dist2 < settings.var_threshold * mode.variance {
                is_background = true;
            }
            if dist2 < settings.var_threshold_gen * mode.variance {
                fits = true;
                weight += alpha;
                let k = alpha / weight;
                for (m, s) in mode.mean.iter_mut().zip(&sample) {
                    *m -= k * (*m - s);
                }
                mode.variance = (mode.variance + k * (dist2 - mode.variance))
                    .clamp(settings.var_min, settings.var_max);
            }
        }

        mode.weight = if weight < prune_below { 0.0 } else { weight };
        cumulative += mode.weight;
    }

    // Drop pruned modes, keeping order.
    let mut kept = 0usize;
    for i in 0..*count as usize {
        if slots[i].weight > 0.0 {
            slots[kept] = slots[i];
            kept += 1;
        }
    }

    let total: f32 = slots[..kept].iter().map(|m| m.weight).sum();
    if total > 0.0 {
        for mode in &mut slots[..kept] {
            mode.weight /= total;
        }
    }

    if !fits {
        let slot = if kept == MAX_MODES { MAX_MODES - 1 } else { kept };
        if slot == 0 {
            slots[0] = Gaussian { weight: 1.0, variance: settings.var_init, mean: sample };
        } else {
            for mode in &mut slots[..slot] {
                mode.weight *= 1.0 - alpha;
            }
            slots[slot] = Gaussian { weight: alpha, variance: settings.var_init, mean: sample };
        }
        kept = slot + 1;
    }

    slots[..kept].sort_unstable_by(|a, b| b.weight.total_cmp(&a.weight));
    *count = kept as u8;

    if is_background {
        BACKGROUND_VALUE
    } else if settings.detect_shadows && is_shadow(&slots[..kept], &sample, settings) {
        SHADOW_VALUE
    } else {
        FOREGROUND_VALUE
    }
}

/// A shadow is a background colour scaled down by a factor in
/// `[shadow_ratio, 1]` and otherwise unchanged.
fn is_shadow(modes: &[Gaussian], sample: &[f32; 3], settings: &MixtureSettings) -> bool {
    let mut cumulative = 0.0f32;
    for mode in modes {
        let numerator: f32 = mode.mean.iter().zip(sample).map(|(m, s)| m * s).sum();
        let denominator: f32 = mode.mean.iter().map(|m| m * m).sum();
        if denominator == 0.0 {
            return false;
        }

        if numerator <= denominator && numerator >= settings.shadow_ratio * denominator {
            let a = numerator / denominator;
            let dist2a: f32 = mode
                .mean
                .iter()
                .zip(sample)
                .map(|(m, s)| (a * m - s) * (a * m - s))
                .sum();
            if dist2a < settings.var_threshold * mode.variance * a * a {
                return true;
            }
        }

        cumulative += mode.weight;
        if cumulative > settings.background_ratio {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn flat(width: u32, height: u32, value: [u8; 3]) -> Frame {
        Frame::from_pixel(width, height, Rgb(value))
    }

    fn count(mask: &Mask, value: u8) -> usize {
        mask.pixels().filter(|p| p[0] == value).count()
    }

    #[test]
    fn static_scene_is_background_from_first_frame() {
        let mut model = BackgroundModel::new(100);
        let frame = flat(32, 24, [60, 70, 80]);
        for _ in 0..20 {
            let mask = model.apply(&frame);
            assert_eq!(count(&mask, BACKGROUND_VALUE), 32 * 24);
        }
        assert_eq!(model.frames_seen(), 20);
    }

    #[test]
    fn bright_object_is_foreground() {
        let mut model = BackgroundModel::new(100);
        let background = flat(40, 40, [50, 50, 50]);
        for _ in 0..30 {
            model.apply(&background);
        }

        let mut frame = background.clone();
        for y in 10..20 {
            for x in 10..20 {
                frame.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        let mask = model.apply(&frame);
        assert_eq!(mask.get_pixel(15, 15)[0], FOREGROUND_VALUE);
        assert_eq!(mask.get_pixel(2, 2)[0], BACKGROUND_VALUE);
        assert_eq!(count(&mask, FOREGROUND_VALUE), 100);
    }

    #[test]
    fn darker_copy_of_background_is_shadow() {
        let mut model = BackgroundModel::new(100);
        let background = flat(8, 8, [200, 180, 160]);
        for _ in 0..30 {
            model.apply(&background);
        }

        let mut frame = background.clone();
        frame.put_pixel(4, 4, Rgb([120, 108, 96]));
        let mask = model.apply(&frame);
        assert_eq!(mask.get_pixel(4, 4)[0], SHADOW_VALUE);
    }

    #[test]
    fn shadows_are_foreground_when_detection_is_off() {
        let settings = MixtureSettings { detect_shadows: false, ..MixtureSettings::default() };
        let mut model = BackgroundModel::with_settings(100, settings);
        let background = flat(8, 8, [200, 180, 160]);
        for _ in 0..30 {
            model.apply(&background);
        }

        let mut frame = background.clone();
        frame.put_pixel(4, 4, Rgb([120, 108, 96]));
        assert_eq!(model.apply(&frame).get_pixel(4, 4)[0], FOREGROUND_VALUE);
    }

    #[test]
    fn persistent_change_is_absorbed_into_background() {
        let mut model = BackgroundModel::new(20);
        let before = flat(8, 8, [40, 40, 40]);
        let after = flat(8, 8, [180, 90, 30]);
        for _ in 0..30 {
            model.apply(&before);
        }
        assert_eq!(count(&model.apply(&after), FOREGROUND_VALUE), 64);
        let mut last = Mask::new(8, 8);
        for _ in 0..100 {
            last = model.apply(&after);
        }
        assert_eq!(count(&last, BACKGROUND_VALUE), 64);
    }

    #[test]
    fn resolution_change_reseeds_model() {
        let mut model = BackgroundModel::new(50);
        model.apply(&flat(8, 8, [10, 10, 10]));
        model.apply(&flat(8, 8, [10, 10, 10]));
        let mask = model.apply(&flat(16, 4, [200, 10, 10]));
        assert_eq!(mask.dimensions(), (16, 4));
        assert_eq!(count(&mask, BACKGROUND_VALUE), 64);
        assert_eq!(model.frames_seen(), 1);
    }

    #[test]
    fn history_is_clamped_and_live_adjustable() {
        let mut model = BackgroundModel::new(0);
        assert_eq!(model.history(), 1);
        model.set_history(750);
        assert_eq!(model.history(), 750);
    }
}
