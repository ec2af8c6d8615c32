use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

/// Identifier of the process owner charged with resource use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub i32);

impl Uid {
    /// No specific owner: the reading covers the whole device.
    pub const SYSTEM: Uid = Uid(-1);

    pub fn as_raw(&self) -> i32 {
        self.0
    }

    /// Negative identifiers terminate streamed owner lists.
    pub fn is_sentinel(&self) -> bool {
        self.0 < 0
    }
}

impl From<i32> for Uid {
    fn from(raw: i32) -> Self {
        Uid(raw)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Cpu,
    Screen,
    Radio,
    Wifi,
    Gps,
    Audio,
    Sensors,
}

impl Subsystem {
    pub const ALL: [Subsystem; 7] = [
        Subsystem::Cpu,
        Subsystem::Screen,
        Subsystem::Radio,
        Subsystem::Wifi,
        Subsystem::Gps,
        Subsystem::Audio,
        Subsystem::Sensors,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Subsystem::Cpu => "CPU",
            Subsystem::Screen => "Screen",
            Subsystem::Radio => "Radio",
            Subsystem::Wifi => "Wi-Fi",
            Subsystem::Gps => "GPS",
            Subsystem::Audio => "Audio",
            Subsystem::Sensors => "Sensors",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Some(Subsystem::Cpu),
            "screen" | "display" => Some(Subsystem::Screen),
            "radio" | "3g" | "cellular" => Some(Subsystem::Radio),
            "wifi" | "wi-fi" => Some(Subsystem::Wifi),
            "gps" => Some(Subsystem::Gps),
            "audio" => Some(Subsystem::Audio),
            "sensors" => Some(Subsystem::Sensors),
            _ => None,
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Cellular radio resource-control state, ascending in power draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RadioPowerState {
    #[default]
    Idle,
    Fach,
    Dch,
}

impl RadioPowerState {
    pub fn label(&self) -> &'static str {
        match self {
            RadioPowerState::Idle => "IDLE",
            RadioPowerState::Fach => "FACH",
            RadioPowerState::Dch => "DCH",
        }
    }
}

impl fmt::Display for RadioPowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WifiState {
    #[default]
    Off,
    Low,
    High,
}

impl WifiState {
    pub fn label(&self) -> &'static str {
        match self {
            WifiState::Off => "off",
            WifiState::Low => "low",
            WifiState::High => "high",
        }
    }
}

/// GPS receiver state. The discriminant indexes `GpsUsage::state_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GpsState {
    #[default]
    Off = 0,
    Sleep = 1,
    On = 2,
}

impl GpsState {
    pub const COUNT: usize = 3;

    pub fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScreenTechnology {
    #[default]
    Oled,
    Lcd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CpuUsage {
    pub frequency_mhz: f64,
    pub user_percent: f64,
    pub sys_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScreenUsage {
    pub screen_on: bool,
    pub brightness: u8,
    /// Estimated pixel power at full brightness, in watts.
    pub pixel_power: f64,
    #[serde(default)]
    pub technology: ScreenTechnology,
}

/// Radio traffic over one iteration. Counts are deltas, not totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RadioUsage {
    pub packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub power_state: RadioPowerState,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WifiUsage {
    pub state: WifiState,
    pub link_speed_mbps: f64,
    /// Uplink rate in bytes per second.
    pub tx_rate: f64,
    pub packets: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GpsUsage {
    /// Seconds spent in each `GpsState` during the iteration.
    pub state_secs: [f64; GpsState::COUNT],
    pub window_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudioUsage {
    pub playing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SensorUsage {
    /// Seconds each named sensor was on during the iteration.
    pub on_secs: BTreeMap<String, f64>,
    pub window_secs: f64,
}

/// One subsystem's measured state for one owner (or the whole device).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subsystem", rename_all = "snake_case")]
pub enum UsageRecord {
    Cpu(CpuUsage),
    Screen(ScreenUsage),
    Radio(RadioUsage),
    Wifi(WifiUsage),
    Gps(GpsUsage),
    Audio(AudioUsage),
    Sensors(SensorUsage),
}

impl UsageRecord {
    /// The empty reading for `subsystem`: nothing measured, zero power.
    pub fn zero(subsystem: Subsystem) -> Self {
        match subsystem {
            Subsystem::Cpu => UsageRecord::Cpu(CpuUsage::default()),
            Subsystem::Screen => UsageRecord::Screen(ScreenUsage::default()),
            Subsystem::Radio => UsageRecord::Radio(RadioUsage::default()),
            Subsystem::Wifi => UsageRecord::Wifi(WifiUsage::default()),
            Subsystem::Gps => UsageRecord::Gps(GpsUsage::default()),
            Subsystem::Audio => UsageRecord::Audio(AudioUsage::default()),
            Subsystem::Sensors => UsageRecord::Sensors(SensorUsage::default()),
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        match self {
            UsageRecord::Cpu(_) => Subsystem::Cpu,
            UsageRecord::Screen(_) => Subsystem::Screen,
            UsageRecord::Radio(_) => Subsystem::Radio,
            UsageRecord::Wifi(_) => Subsystem::Wifi,
            UsageRecord::Gps(_) => Subsystem::Gps,
            UsageRecord::Audio(_) => Subsystem::Audio,
            UsageRecord::Sensors(_) => Subsystem::Sensors,
        }
    }

    /// Writes the record as `key value` lines.
    pub fn log(&self, out: &mut dyn Write) -> io::Result<()> {
        match self {
            UsageRecord::Cpu(cpu) => {
                writeln!(out, "cpu-freq-mhz {:.0}", cpu.frequency_mhz)?;
                writeln!(out, "cpu-usr-percent {:.2}", cpu.user_percent)?;
                writeln!(out, "cpu-sys-percent {:.2}", cpu.sys_percent)
            }
            UsageRecord::Screen(screen) => {
                writeln!(out, "screen-on {}", screen.screen_on)?;
                writeln!(out, "screen-brightness {}", screen.brightness)?;
                writeln!(out, "screen-pix-power {:.4}", screen.pixel_power)
            }
            UsageRecord::Radio(radio) => {
                writeln!(out, "radio-packets {}", radio.packets)?;
                writeln!(
                    out,
                    "radio-tx-bytes {} ({})",
                    radio.tx_bytes,
                    ByteSize::b(radio.tx_bytes)
                )?;
                writeln!(
                    out,
                    "radio-rx-bytes {} ({})",
                    radio.rx_bytes,
                    ByteSize::b(radio.rx_bytes)
                )?;
                writeln!(out, "radio-power-state {}", radio.power_state)?;
                writeln!(
                    out,
                    "radio-provider {}",
                    radio.provider.as_deref().unwrap_or("none")
                )
            }
            UsageRecord::Wifi(wifi) => {
                writeln!(out, "wifi-state {}", wifi.state.label())?;
                writeln!(out, "wifi-link-speed-mbps {:.1}", wifi.link_speed_mbps)?;
                writeln!(out, "wifi-tx-rate {:.1}", wifi.tx_rate)?;
                writeln!(out, "wifi-packets {}", wifi.packets)
            }
            UsageRecord::Gps(gps) => {
                writeln!(
                    out,
                    "gps-state-secs {:.2} {:.2} {:.2}",
                    gps.state_secs[GpsState::Off.index()],
                    gps.state_secs[GpsState::Sleep.index()],
                    gps.state_secs[GpsState::On.index()]
                )
            }
            UsageRecord::Audio(audio) => writeln!(out, "audio-playing {}", audio.playing),
            UsageRecord::Sensors(sensors) => {
                for (name, secs) in &sensors.on_secs {
                    writeln!(out, "sensor-on-secs {} {:.2}", name, secs)?;
                }
                Ok(())
            }
        }
    }
}
