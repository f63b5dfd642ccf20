//! Frame sequence source
//!
//! The demo plays an ordered directory of image files (numbered frames
//! exported from a clip). Unreadable files are skipped with a warning.

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::warn;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Ordered sequence of frame files
pub struct FrameSource {
    frames: Vec<PathBuf>,
    position: usize,
}

impl FrameSource {
    /// Collect frame files from a directory in filename order.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("cannot open frames directory {}", dir.display()))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        frames.sort();

        if frames.is_empty() {
            anyhow::bail!("no frame images found in {}", dir.display());
        }

        Ok(Self {
            frames,
            position: 0,
        })
    }

    /// Number of frames in the sequence
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Read the next frame, skipping files that fail to decode. Returns
    /// `None` once the sequence is exhausted.
    pub fn next_frame(&mut self) -> Option<RgbImage> {
        while self.position < self.frames.len() {
            let path = &self.frames[self.position];
            self.position += 1;

            match image::open(path) {
                Ok(frame) => return Some(frame.to_rgb8()),
                Err(e) => {
                    warn!("skipping unreadable frame {}: {}", path.display(), e);
                }
            }
        }
        None
    }
}
