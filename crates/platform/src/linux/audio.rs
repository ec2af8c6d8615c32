use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::Result;

use crate::sources::AudioSource;

const ASOUND_PATH: &str = "/proc/asound";

/// Detects playback by scanning ALSA playback substreams for a running state.
pub struct AlsaPlayback {
    asound_root: PathBuf,
}

impl AlsaPlayback {
    pub fn new() -> Self {
        Self::with_root(ASOUND_PATH)
    }

    pub fn with_root(asound_root: impl Into<PathBuf>) -> Self {
        Self {
            asound_root: asound_root.into(),
        }
    }
}

impl Default for AlsaPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for AlsaPlayback {
    fn is_playing(&self) -> Result<bool> {
        if !self.asound_root.is_dir() {
            return Ok(false);
        }

        for card in subdirs(&self.asound_root, "card") {
            // Playback devices end in 'p' (pcm0p), capture in 'c'.
            for pcm in subdirs(&card, "pcm").filter(|p| p.to_string_lossy().ends_with('p')) {
                for sub in subdirs(&pcm, "sub") {
                    if let Ok(status) = fs::read_to_string(sub.join("status")) {
                        if status.lines().any(|l| l.trim() == "state: RUNNING") {
                            return Ok(true);
                        }
                    }
                }
            }
        }

        Ok(false)
    }
}

fn subdirs<'a>(dir: &Path, prefix: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .filter(move |e| e.file_name().to_string_lossy().starts_with(prefix))
        .map(|e| e.path())
        .filter(|p| p.is_dir())
}
