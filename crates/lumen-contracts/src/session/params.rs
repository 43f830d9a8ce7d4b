use serde::{Deserialize, Serialize};

pub const BRIGHTNESS_RANGE: (i32, i32) = (-100, 100);
pub const CONTRAST_RANGE: (f64, f64) = (0.5, 3.0);
pub const BLUR_RANGE: (u32, u32) = (0, 25);
pub const SHARPEN_RANGE: (f64, f64) = (0.0, 3.0);
pub const ROTATION_RANGE: (i32, i32) = (0, 360);

/// Current value of every filter control for one image.
///
/// Field names on the wire follow the `control_states` object of the session
/// file. Missing fields fall back to the identity value, so an empty `{}`
/// snapshot decodes to [`ControlParams::default`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlParams {
    pub brightness: i32,
    pub contrast: f64,
    pub blur: u32,
    pub sharpen: f64,
    pub rotation: i32,
    pub grayscale: bool,
    #[serde(rename = "flip_h")]
    pub flip_horizontal: bool,
    #[serde(rename = "flip_v")]
    pub flip_vertical: bool,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            brightness: 0,
            contrast: 1.0,
            blur: 0,
            sharpen: 0.0,
            rotation: 0,
            grayscale: false,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }
}

/// A single control change, already typed for its control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    Brightness(i32),
    Contrast(f64),
    Blur(u32),
    Sharpen(f64),
    Rotation(i32),
    Grayscale(bool),
    FlipHorizontal(bool),
    FlipVertical(bool),
}

impl Adjustment {
    pub fn control_name(&self) -> &'static str {
        match self {
            Adjustment::Brightness(_) => "brightness",
            Adjustment::Contrast(_) => "contrast",
            Adjustment::Blur(_) => "blur",
            Adjustment::Sharpen(_) => "sharpen",
            Adjustment::Rotation(_) => "rotation",
            Adjustment::Grayscale(_) => "grayscale",
            Adjustment::FlipHorizontal(_) => "flip_h",
            Adjustment::FlipVertical(_) => "flip_v",
        }
    }
}

impl ControlParams {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Applies one adjustment, clamping the value into the control's range.
    pub fn apply(&mut self, adjustment: Adjustment) {
        match adjustment {
            Adjustment::Brightness(value) => {
                self.brightness = value.clamp(BRIGHTNESS_RANGE.0, BRIGHTNESS_RANGE.1)
            }
            Adjustment::Contrast(value) => self.contrast = clamp_f64(value, CONTRAST_RANGE, 1.0),
            Adjustment::Blur(value) => self.blur = value.clamp(BLUR_RANGE.0, BLUR_RANGE.1),
            Adjustment::Sharpen(value) => self.sharpen = clamp_f64(value, SHARPEN_RANGE, 0.0),
            Adjustment::Rotation(value) => {
                self.rotation = value.clamp(ROTATION_RANGE.0, ROTATION_RANGE.1)
            }
            Adjustment::Grayscale(value) => self.grayscale = value,
            Adjustment::FlipHorizontal(value) => self.flip_horizontal = value,
            Adjustment::FlipVertical(value) => self.flip_vertical = value,
        }
    }

    /// Returns a copy with every numeric field forced into its range.
    ///
    /// Snapshots read from disk go through this before they reach the filter
    /// pipeline.
    pub fn clamped(&self) -> Self {
        let mut out = *self;
        out.apply(Adjustment::Brightness(self.brightness));
        out.apply(Adjustment::Contrast(self.contrast));
        out.apply(Adjustment::Blur(self.blur));
        out.apply(Adjustment::Sharpen(self.sharpen));
        out.apply(Adjustment::Rotation(self.rotation));
        out
    }

    /// Multi-line summary of the controls, used in model prompts and the CLI.
    pub fn describe(&self) -> String {
        format!(
            "- Brightness: {}\n- Contrast: {:.2}\n- Blur: {}\n- Sharpen: {:.1}\n- Rotation: {}°\n- Grayscale: {}\n- Horizontal flip: {}\n- Vertical flip: {}\n",
            self.brightness,
            self.contrast,
            self.blur,
            self.sharpen,
            self.rotation,
            if self.grayscale { "on" } else { "off" },
            if self.flip_horizontal { "yes" } else { "no" },
            if self.flip_vertical { "yes" } else { "no" },
        )
    }
}

fn clamp_f64(value: f64, range: (f64, f64), fallback: f64) -> f64 {
    if value.is_nan() {
        return fallback;
    }
    value.clamp(range.0, range.1)
}
