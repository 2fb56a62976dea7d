use anyhow::Context;
use std::fs;
use std::path::Path;

const FALLBACK_COLOR: [u8; 3] = [255, 255, 255];

/// Class names in model output order, each with its own box color.
#[derive(Debug, Clone)]
pub struct Labels {
    names: Vec<String>,
    colors: Vec<[u8; 3]>,
}

impl Labels {
    /// Read one class name per line. Blank lines are skipped.
    pub fn load(path: &Path, color_seed: Option<u64>) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read labels from {}", path.display()))?;
        let names: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            anyhow::bail!("No labels found in {}", path.display());
        }

        tracing::debug!(path = %path.display(), classes = names.len(), "Labels loaded");
        Ok(Self::with_names(names, color_seed))
    }

    pub fn with_names(names: Vec<String>, color_seed: Option<u64>) -> Self {
        let mut rng = match color_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let colors = names
            .iter()
            .map(|_| [rng.u8(..), rng.u8(..), rng.u8(..)])
            .collect();
        Self { names, colors }
    }

    pub fn class_count(&self) -> usize {
        self.names.len()
    }

    pub fn name(&self, class_id: u32) -> &str {
        self.names
            .get(class_id as usize)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    pub fn color(&self, class_id: u32) -> [u8; 3] {
        self.colors
            .get(class_id as usize)
            .copied()
            .unwrap_or(FALLBACK_COLOR)
    }
}
