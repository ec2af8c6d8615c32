//! Device calibration: the constants and curves that turn usage into watts.
//!
//! A profile is loaded once from TOML, validated, and then shared read-only
//! by every monitor and by the estimator.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use drainwatch_platform::SensorRating;
use drainwatch_protocol::{
    GpsState, RadioPowerState, ScreenTechnology, ScreenUsage, UsageRecord, WifiState,
};
use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use crate::interpolate::Curve;

/// Full-channel value squared (255²).
const CHANNEL_SQUARED: f64 = 65_025.0;
/// Full value of all three channels summed, squared ((3·255)²).
const MODULATION_SQUARED: f64 = 585_225.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuModel {
    pub frequencies_mhz: Vec<f64>,
    /// Watts per percent of utilization at each frequency.
    pub ratios: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenModel {
    #[serde(default)]
    pub technology: ScreenTechnology,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub oled_base_watts: f64,
    /// Per-pixel watts of a full red, green and blue channel.
    #[serde(default)]
    pub channel_watts: [f64; 3],
    /// Per-pixel watts saved when all channels are fully lit together.
    #[serde(default)]
    pub modulation_watts: f64,
    #[serde(default)]
    pub lcd_backlight_watts: f64,
    /// Watts added per brightness step on LCD panels.
    #[serde(default)]
    pub lcd_brightness_watts: f64,
}

impl ScreenModel {
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WifiModel {
    pub low_watts: f64,
    pub high_watts: f64,
    /// Packets per second above which the link enters the high state.
    pub low_high_packets: f64,
    /// Packets per second below which the link drops back to low.
    pub high_low_packets: f64,
    pub link_speeds_mbps: Vec<f64>,
    /// Watts per byte/s of uplink at each link speed.
    pub link_ratios: Vec<f64>,
}

/// Per-provider radio constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioProfile {
    pub idle_watts: f64,
    pub fach_watts: f64,
    pub dch_watts: f64,
    /// Seconds of inactivity before DCH demotes to FACH.
    pub dch_fach_secs: f64,
    /// Seconds of inactivity before FACH demotes to IDLE.
    pub fach_idle_secs: f64,
    /// Modem transmit/receive queue sizes in bytes. Reported only; any
    /// traffic in FACH promotes to DCH regardless of volume.
    #[serde(default)]
    pub tx_queue: u64,
    #[serde(default)]
    pub rx_queue: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioModel {
    pub default: RadioProfile,
    #[serde(default)]
    pub providers: BTreeMap<String, RadioProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GpsModel {
    /// Watts drawn in the off, sleep and on states.
    pub state_watts: [f64; GpsState::COUNT],
    /// Seconds the receiver stays in sleep after the engine stops.
    pub sleep_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AudioModel {
    pub watts: f64,
}

/// Dwell timings and queue sizes of one radio provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioTiming {
    pub dch_fach_secs: f64,
    pub fach_idle_secs: f64,
    pub tx_queue: u64,
    pub rx_queue: u64,
}

/// Per-pixel OLED power coefficients derived from the screen model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelCoefficients {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub modulation: f64,
}

impl PixelCoefficients {
    /// Power of one pixel at full brightness. May be negative for dim
    /// pixels on strongly modulated panels; callers floor the total.
    pub fn pixel_power(&self, red: u8, green: u8, blue: u8) -> f64 {
        let (r, g, b) = (red as f64, green as f64, blue as f64);
        let sum = r + g + b;
        self.red * r * r + self.green * g * g + self.blue * b * b - self.modulation * sum * sum
    }
}

/// An immutable device profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub model: String,
    pub cpu: CpuModel,
    pub screen: ScreenModel,
    #[serde(default)]
    pub wifi: WifiModel,
    pub radio: RadioModel,
    #[serde(default)]
    pub gps: GpsModel,
    #[serde(default)]
    pub audio: AudioModel,
    /// Watts drawn by each named sensor while on.
    #[serde(default)]
    pub sensors: BTreeMap<String, f64>,
}

impl Calibration {
    pub fn from_path(path: &Path) -> Result<Self, CalibrationError> {
        let content = fs::read_to_string(path).map_err(|source| CalibrationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CalibrationError> {
        let calibration: Calibration = toml::from_str(content)?;
        calibration.validate()?;
        Ok(calibration)
    }

    /// Adds sensor ratings reported by the platform. Ratings already present
    /// in the profile take precedence.
    pub fn with_sensor_ratings(mut self, ratings: &[SensorRating]) -> Result<Self, CalibrationError> {
        for rating in ratings {
            check_constant(&format!("sensors.{}", rating.name), rating.watts)?;
            self.sensors
                .entry(rating.name.clone())
                .or_insert(rating.watts);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.cpu_curve().is_empty() {
            return Err(CalibrationError::EmptyTable { table: "cpu" });
        }
        check_curve("cpu", self.cpu_curve())?;
        check_curve("wifi", self.wifi_curve())?;

        if self.screen.width == 0 || self.screen.height == 0 {
            return Err(CalibrationError::ZeroScreen);
        }

        let screen = &self.screen;
        for (field, value) in [
            ("screen.oled_base_watts", screen.oled_base_watts),
            ("screen.channel_watts[0]", screen.channel_watts[0]),
            ("screen.channel_watts[1]", screen.channel_watts[1]),
            ("screen.channel_watts[2]", screen.channel_watts[2]),
            ("screen.modulation_watts", screen.modulation_watts),
            ("screen.lcd_backlight_watts", screen.lcd_backlight_watts),
            ("screen.lcd_brightness_watts", screen.lcd_brightness_watts),
            ("wifi.low_watts", self.wifi.low_watts),
            ("wifi.high_watts", self.wifi.high_watts),
            ("wifi.low_high_packets", self.wifi.low_high_packets),
            ("wifi.high_low_packets", self.wifi.high_low_packets),
            ("gps.sleep_secs", self.gps.sleep_secs),
            ("audio.watts", self.audio.watts),
        ] {
            check_constant(field, value)?;
        }

        for (i, watts) in self.gps.state_watts.iter().enumerate() {
            check_constant(&format!("gps.state_watts[{}]", i), *watts)?;
        }

        check_radio_profile("radio.default", &self.radio.default)?;
        for (name, profile) in &self.radio.providers {
            check_radio_profile(&format!("radio.providers.{}", name), profile)?;
        }

        for (name, watts) in &self.sensors {
            check_constant(&format!("sensors.{}", name), *watts)?;
        }

        Ok(())
    }

    pub fn cpu_curve(&self) -> Curve<'_> {
        Curve::new(&self.cpu.frequencies_mhz, &self.cpu.ratios)
    }

    pub fn wifi_curve(&self) -> Curve<'_> {
        Curve::new(&self.wifi.link_speeds_mbps, &self.wifi.link_ratios)
    }

    pub fn cpu_power(&self, frequency_mhz: f64, user_percent: f64, sys_percent: f64) -> f64 {
        let ratio = self.cpu_curve().ratio_at(frequency_mhz);
        (ratio * (user_percent + sys_percent)).max(0.0)
    }

    pub fn wifi_power(&self, state: WifiState, speed_mbps: f64, tx_rate: f64) -> f64 {
        match state {
            WifiState::Off => 0.0,
            WifiState::Low => self.wifi.low_watts.max(0.0),
            WifiState::High => {
                let ratio = self.wifi_curve().ratio_at(speed_mbps);
                (self.wifi.high_watts + ratio * tx_rate).max(0.0)
            }
        }
    }

    /// Constants for `provider`, or the default profile when the provider is
    /// unknown or has been cleared.
    pub fn radio_profile(&self, provider: Option<&str>) -> &RadioProfile {
        provider
            .and_then(|name| self.radio.providers.get(name))
            .unwrap_or(&self.radio.default)
    }

    pub fn radio_timing(&self, provider: Option<&str>) -> RadioTiming {
        let profile = self.radio_profile(provider);
        RadioTiming {
            dch_fach_secs: profile.dch_fach_secs,
            fach_idle_secs: profile.fach_idle_secs,
            tx_queue: profile.tx_queue,
            rx_queue: profile.rx_queue,
        }
    }

    pub fn radio_power(&self, state: RadioPowerState, provider: Option<&str>) -> f64 {
        let profile = self.radio_profile(provider);
        let watts = match state {
            RadioPowerState::Idle => profile.idle_watts,
            RadioPowerState::Fach => profile.fach_watts,
            RadioPowerState::Dch => profile.dch_watts,
        };
        watts.max(0.0)
    }

    pub fn gps_power(&self, state_secs: &[f64; GpsState::COUNT], window_secs: f64) -> f64 {
        if window_secs <= 0.0 {
            return 0.0;
        }
        let energy: f64 = state_secs
            .iter()
            .zip(self.gps.state_watts.iter())
            .map(|(secs, watts)| secs * watts)
            .sum();
        (energy / window_secs).max(0.0)
    }

    pub fn audio_power(&self, playing: bool) -> f64 {
        if playing {
            self.audio.watts.max(0.0)
        } else {
            0.0
        }
    }

    /// Sensors missing from the profile contribute nothing.
    pub fn sensor_power(&self, on_secs: &BTreeMap<String, f64>, window_secs: f64) -> f64 {
        if window_secs <= 0.0 {
            return 0.0;
        }
        let energy: f64 = on_secs
            .iter()
            .filter_map(|(name, secs)| self.sensors.get(name).map(|watts| secs * watts))
            .sum();
        (energy / window_secs).max(0.0)
    }

    pub fn screen_power(&self, usage: &ScreenUsage) -> f64 {
        if !usage.screen_on {
            return 0.0;
        }
        let brightness = usage.brightness as f64;
        let watts = match usage.technology {
            ScreenTechnology::Oled => {
                self.screen.oled_base_watts + usage.pixel_power * brightness / 255.0
            }
            ScreenTechnology::Lcd => {
                self.screen.lcd_backlight_watts + self.screen.lcd_brightness_watts * brightness
            }
        };
        watts.max(0.0)
    }

    pub fn pixel_coefficients(&self) -> PixelCoefficients {
        let [red, green, blue] = self.screen.channel_watts;
        PixelCoefficients {
            red: red / CHANNEL_SQUARED,
            green: green / CHANNEL_SQUARED,
            blue: blue / CHANNEL_SQUARED,
            modulation: self.screen.modulation_watts / MODULATION_SQUARED,
        }
    }

    /// Watts for any usage record.
    pub fn score(&self, record: &UsageRecord) -> f64 {
        match record {
            UsageRecord::Cpu(cpu) => {
                self.cpu_power(cpu.frequency_mhz, cpu.user_percent, cpu.sys_percent)
            }
            UsageRecord::Screen(screen) => self.screen_power(screen),
            UsageRecord::Radio(radio) => {
                self.radio_power(radio.power_state, radio.provider.as_deref())
            }
            UsageRecord::Wifi(wifi) => {
                self.wifi_power(wifi.state, wifi.link_speed_mbps, wifi.tx_rate)
            }
            UsageRecord::Gps(gps) => self.gps_power(&gps.state_secs, gps.window_secs),
            UsageRecord::Audio(audio) => self.audio_power(audio.playing),
            UsageRecord::Sensors(sensors) => {
                self.sensor_power(&sensors.on_secs, sensors.window_secs)
            }
        }
    }
}

fn check_constant(field: &str, value: f64) -> Result<(), CalibrationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CalibrationError::InvalidConstant {
            field: field.to_string(),
        })
    }
}

fn check_curve(table: &'static str, curve: Curve<'_>) -> Result<(), CalibrationError> {
    if !curve.lengths_match() {
        return Err(CalibrationError::TableLength {
            table,
            breakpoints: curve.breakpoints().len(),
            ratios: curve.ratios().len(),
        });
    }
    if !curve.is_ascending() {
        return Err(CalibrationError::Unsorted { table });
    }
    for (i, ratio) in curve.ratios().iter().enumerate() {
        check_constant(&format!("{}.ratios[{}]", table, i), *ratio)?;
    }
    Ok(())
}

fn check_radio_profile(prefix: &str, profile: &RadioProfile) -> Result<(), CalibrationError> {
    for (field, value) in [
        ("idle_watts", profile.idle_watts),
        ("fach_watts", profile.fach_watts),
        ("dch_watts", profile.dch_watts),
        ("dch_fach_secs", profile.dch_fach_secs),
        ("fach_idle_secs", profile.fach_idle_secs),
    ] {
        check_constant(&format!("{}.{}", prefix, field), value)?;
    }
    Ok(())
}
