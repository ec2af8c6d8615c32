use std::fs;
use std::path::{Path, PathBuf};

use super::{read_trimmed, read_u64};
use crate::sources::{DisplaySource, BRIGHTNESS_UNAVAILABLE};

const BACKLIGHT_PATH: &str = "/sys/class/backlight";
const FRAMEBUFFER_CANDIDATES: &[&str] = &["/dev/fb0", "/dev/graphics/fb0"];

/// Reads brightness from the first backlight device, rescaled to `0..=255`.
pub struct LinuxDisplay {
    backlight: Option<PathBuf>,
}

impl LinuxDisplay {
    pub fn new() -> Self {
        Self::with_root(BACKLIGHT_PATH)
    }

    pub fn with_root(backlight_root: impl AsRef<Path>) -> Self {
        Self {
            backlight: discover_backlight(backlight_root.as_ref()),
        }
    }

    pub fn backlight_path(&self) -> Option<&Path> {
        self.backlight.as_deref()
    }
}

impl Default for LinuxDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySource for LinuxDisplay {
    fn brightness(&self) -> i32 {
        let Some(ref dir) = self.backlight else {
            return BRIGHTNESS_UNAVAILABLE;
        };

        let (Ok(current), Ok(max)) = (
            read_u64(&dir.join("brightness")),
            read_u64(&dir.join("max_brightness")),
        ) else {
            return BRIGHTNESS_UNAVAILABLE;
        };

        if max == 0 {
            return BRIGHTNESS_UNAVAILABLE;
        }

        ((current.min(max) * 255 + max / 2) / max) as i32
    }
}

fn discover_backlight(root: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.join("max_brightness").exists())
        .collect();
    entries.sort();
    entries.into_iter().next()
}

/// Returns the first framebuffer device node present on this system.
pub fn find_framebuffer() -> Option<PathBuf> {
    FRAMEBUFFER_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

/// Reads `(width, height)` in pixels from a framebuffer's sysfs node,
/// e.g. `/sys/class/graphics/fb0`.
pub fn framebuffer_geometry(fb_sysfs: &Path) -> Option<(u32, u32)> {
    let size = read_trimmed(&fb_sysfs.join("virtual_size")).ok()?;
    let (width, height) = size.split_once(',')?;
    Some((width.trim().parse().ok()?, height.trim().parse().ok()?))
}

/// Whether the framebuffer is blanked (display off).
pub fn is_blanked(fb_sysfs: &Path) -> Option<bool> {
    let blank = read_trimmed(&fb_sysfs.join("blank")).ok()?;
    Some(blank.parse::<i32>().ok()? != 0)
}
