//! Display monitor.
//!
//! OLED power depends on what is drawn, so a fixed set of framebuffer pixels
//! is sampled each iteration and extrapolated to the whole panel. LCD power
//! only depends on the backlight.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use drainwatch_platform::{DisplaySource, ForegroundSource};
use drainwatch_protocol::{
    IterationSnapshot, ScreenTechnology, ScreenUsage, Subsystem, Uid, UsageRecord,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::Monitor;
use crate::calibration::{Calibration, PixelCoefficients};
use crate::error::MonitorError;
use crate::screen_state::ScreenState;

pub const DEFAULT_SAMPLE_COUNT: usize = 500;

const BYTES_PER_PIXEL: u64 = 4;

#[derive(Debug, Clone)]
pub struct ScreenConfig {
    /// Framebuffer device. Pixel power is zero when unset.
    pub framebuffer: Option<PathBuf>,
    pub sample_count: usize,
    /// Fixes the sample offsets, mainly for tests.
    pub seed: Option<u64>,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            framebuffer: None,
            sample_count: DEFAULT_SAMPLE_COUNT,
            seed: None,
        }
    }
}

pub struct ScreenMonitor {
    technology: ScreenTechnology,
    pixel_count: u64,
    coefficients: PixelCoefficients,
    framebuffer: Option<PathBuf>,
    offsets: Vec<u64>,
    screen: ScreenState,
    display: Box<dyn DisplaySource>,
    foreground: Box<dyn ForegroundSource>,
}

impl ScreenMonitor {
    pub fn new(
        calibration: Arc<Calibration>,
        config: ScreenConfig,
        screen: ScreenState,
        display: Box<dyn DisplaySource>,
        foreground: Box<dyn ForegroundSource>,
    ) -> Self {
        let technology = calibration.screen.technology;
        let pixel_count = calibration.screen.pixel_count();

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let offsets = match technology {
            ScreenTechnology::Oled => sample_offsets(pixel_count, config.sample_count, &mut rng),
            ScreenTechnology::Lcd => Vec::new(),
        };

        if technology == ScreenTechnology::Oled && config.framebuffer.is_none() {
            warn!("No framebuffer configured, OLED pixel power will read as zero");
        }

        Self {
            technology,
            pixel_count,
            coefficients: calibration.pixel_coefficients(),
            framebuffer: config.framebuffer,
            offsets,
            screen,
            display,
            foreground,
        }
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Whole-panel pixel power at full brightness.
    fn pixel_power(&self) -> f64 {
        let Some(path) = self.framebuffer.as_deref() else {
            return 0.0;
        };
        if self.offsets.is_empty() {
            return 0.0;
        }

        let sum = match self.sample_framebuffer(path) {
            Ok(sum) => sum,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read framebuffer");
                return 0.0;
            }
        };

        if sum > 0.0 {
            sum * self.pixel_count as f64 / self.offsets.len() as f64
        } else {
            0.0
        }
    }

    fn sample_framebuffer(&self, path: &Path) -> io::Result<f64> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; 4];
        let mut sum = 0.0;

        for offset in &self.offsets {
            file.seek(SeekFrom::Start(offset * BYTES_PER_PIXEL))?;
            file.read_exact(&mut buf)?;
            let (red, green, blue) = decode_pixel(u32::from_ne_bytes(buf));
            sum += self.coefficients.pixel_power(red, green, blue);
        }

        Ok(sum)
    }
}

impl Monitor for ScreenMonitor {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Screen
    }

    fn sample_iteration(&mut self, iteration: u64) -> Result<IterationSnapshot, MonitorError> {
        if !self.screen.is_on() {
            return Ok(IterationSnapshot::zero(Subsystem::Screen, iteration));
        }

        let raw = self.display.brightness();
        let Ok(brightness) = u8::try_from(raw) else {
            warn!(brightness = raw, "Could not retrieve display brightness");
            return Ok(IterationSnapshot::zero(Subsystem::Screen, iteration));
        };

        let pixel_power = match self.technology {
            ScreenTechnology::Oled => self.pixel_power(),
            ScreenTechnology::Lcd => 0.0,
        };

        let usage = UsageRecord::Screen(ScreenUsage {
            screen_on: true,
            brightness,
            pixel_power,
            technology: self.technology,
        });

        let mut snapshot = IterationSnapshot::new(iteration, usage.clone());
        let uid = Uid(self.foreground.foreground_owner());
        if uid.is_sentinel() {
            debug!("No foreground owner for screen usage");
        } else {
            snapshot.set_owner_usage(uid, usage);
        }

        Ok(snapshot)
    }
}

/// Picks one pixel from each of `count` stripes spanning the whole panel.
/// Stripe boundaries are rounded so the last one ends at the last pixel.
fn sample_offsets(pixel_count: u64, count: usize, rng: &mut StdRng) -> Vec<u64> {
    if pixel_count == 0 || count == 0 {
        return Vec::new();
    }

    let boundary = |i: usize| (i as u128 * pixel_count as u128 / count as u128) as u64;
    (0..count)
        .map(|i| {
            let start = boundary(i);
            let end = boundary(i + 1).max(start + 1);
            rng.gen_range(start..end).min(pixel_count - 1)
        })
        .collect()
}

/// Splits a framebuffer word into red, green and blue.
fn decode_pixel(px: u32) -> (u8, u8, u8) {
    let red = (px >> 24) & 0xFF;
    let green = (px >> 16) & 0xFF;
    let blue = (px >> 8) & 0xFF;
    (red as u8, green as u8, blue as u8)
}
