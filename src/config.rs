// src/config.rs

use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_yaml(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the tracker degenerate.
    pub fn validate(&self) -> Result<()> {
        let t = &self.tracking;
        if t.buffer_size == 0 {
            bail!("tracking.buffer_size must be at least 1");
        }
        if t.n_windows == 0 {
            bail!("tracking.n_windows must be at least 1");
        }
        if t.margin == 0 || t.prior_margin == 0 {
            bail!("tracking margins must be positive");
        }
        if !(self.scale.xm_per_pix > 0.0 && self.scale.ym_per_pix > 0.0) {
            bail!(
                "scale factors must be positive (xm_per_pix={}, ym_per_pix={})",
                self.scale.xm_per_pix,
                self.scale.ym_per_pix
            );
        }
        let o = &self.overlay;
        for (name, alpha) in [("lane_alpha", o.lane_alpha), ("header_alpha", o.header_alpha)] {
            if !(0.0..=1.0).contains(&alpha) {
                bail!("overlay.{} must be in [0, 1], got {}", name, alpha);
            }
        }
        if !(o.thumb_ratio > 0.0 && o.thumb_ratio <= 0.33) {
            bail!("overlay.thumb_ratio must be in (0, 0.33], got {}", o.thumb_ratio);
        }
        Ok(())
    }
}
