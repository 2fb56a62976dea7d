use ab_glyph::{FontArc, PxScale};
use anyhow::Context;
use std::fs;
use std::path::Path;

/// DejaVu Sans, used when no font file is configured.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
const LABEL_HEIGHT_PX: f32 = 16.0;

/// Typeface and size of the `"<label>: <confidence>"` captions.
#[derive(Clone)]
pub struct LabelFont {
    font: FontArc,
    scale: PxScale,
}

impl LabelFont {
    /// Load a TrueType/OpenType file, or the bundled font when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Self::bundled();
        };
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read font from {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|_| anyhow::anyhow!("{} is not a usable font", path.display()))?;
        tracing::debug!(path = %path.display(), "Label font loaded");
        Ok(Self::with_font(font))
    }

    pub fn bundled() -> anyhow::Result<Self> {
        let font = FontArc::try_from_slice(BUNDLED_FONT)
            .map_err(|_| anyhow::anyhow!("Bundled label font is corrupt"))?;
        Ok(Self::with_font(font))
    }

    fn with_font(font: FontArc) -> Self {
        Self {
            font,
            scale: PxScale::from(LABEL_HEIGHT_PX),
        }
    }

    pub fn font(&self) -> &FontArc {
        &self.font
    }

    pub fn scale(&self) -> PxScale {
        self.scale
    }
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelFont")
            .field("scale", &self.scale.y)
            .finish()
    }
}
