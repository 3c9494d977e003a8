use serde::{Deserialize, Serialize};

/// Tunables for the legibility transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessConfig {
    /// Width of the centered crop as a fraction of the frame width.
    pub crop_width_fraction: f32,

    /// Height of the centered crop as a fraction of the frame height.
    pub crop_height_fraction: f32,

    /// Resampling factor applied to the cropped rectangle.
    pub scale_factor: f32,

    /// Grayscale values at or above this become white, the rest black.
    pub binarization_threshold: u8,
}

impl PreprocessConfig {
    pub const fn normal() -> Self {
        Self {
            crop_width_fraction: 0.7,
            crop_height_fraction: 0.6,
            scale_factor: 2.0,
            binarization_threshold: 128,
        }
    }

    /// Tighter crop and stronger upscale for small centered dialogs.
    pub const fn focus() -> Self {
        Self {
            crop_width_fraction: 0.4,
            crop_height_fraction: 0.4,
            scale_factor: 3.0,
            binarization_threshold: 128,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("cropWidthFraction", self.crop_width_fraction),
            ("cropHeightFraction", self.crop_height_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if !(self.scale_factor.is_finite() && self.scale_factor > 0.0) {
            return Err(format!(
                "scaleFactor must be positive, got {}",
                self.scale_factor
            ));
        }
        Ok(())
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self::normal()
    }
}

/// Named presets, selectable per analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreprocessPreset {
    Normal,
    Focus,
}

impl PreprocessPreset {
    pub fn from_focus_mode(focus_mode: bool) -> Self {
        if focus_mode {
            PreprocessPreset::Focus
        } else {
            PreprocessPreset::Normal
        }
    }
}
