//! Wires host collaborators into monitors according to the user config.

#[cfg(not(all(target_os = "linux", feature = "linux")))]
compile_error!("drainwatch currently reads counters from sysfs/procfs and needs the `linux` feature on Linux");

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use drainwatch_engine::monitor::{
    AudioMonitor, CpuMonitor, GpsMonitor, RadioConfig, RadioMonitor, ScreenConfig, ScreenMonitor,
    SensorMonitor, WifiConfig, WifiMonitor,
};
use drainwatch_engine::{Calibration, Monitor, ScreenState};
use drainwatch_platform::linux::{
    find_framebuffer, framebuffer_geometry, is_blanked, AlsaPlayback, InvokingUserForeground,
    LinuxCpu, LinuxDisplay, LinuxNetwork, LinuxOwners, LinuxWifiLink, StaticTelephony,
    UnavailableGps, UnavailableSensors,
};
use drainwatch_platform::{NetworkType, SensorSource};
use drainwatch_protocol::Subsystem;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::UserConfig;

const GRAPHICS_CLASS_PATH: &str = "/sys/class/graphics";
const BLANK_POLL: Duration = Duration::from_millis(500);

/// Loads the configured profile and folds in the host's sensor ratings.
pub fn load_calibration(config: &UserConfig) -> Result<Calibration> {
    let path = config.profile_path()?;
    let calibration = Calibration::from_path(path)?;

    let ratings = UnavailableSensors
        .list_sensors_with_rated_power()
        .wrap_err("listing sensor ratings")?;
    let calibration = calibration.with_sensor_ratings(&ratings)?;

    info!(model = %calibration.model, profile = %path.display(), "Loaded device profile");
    Ok(calibration)
}

pub fn framebuffer_device(config: &UserConfig) -> Option<PathBuf> {
    config.framebuffer.clone().or_else(find_framebuffer)
}

/// Maps a device node such as `/dev/graphics/fb0` to its sysfs directory.
pub fn framebuffer_sysfs(device: &Path) -> Option<PathBuf> {
    let name = device.file_name()?;
    Some(Path::new(GRAPHICS_CLASS_PATH).join(name))
}

/// Builds one monitor per enabled subsystem, in subsystem order.
pub fn build_monitors(
    config: &UserConfig,
    calibration: &Arc<Calibration>,
    screen: &ScreenState,
) -> Result<Vec<Box<dyn Monitor>>> {
    let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();

    for subsystem in config.enabled_subsystems()? {
        let monitor: Box<dyn Monitor> = match subsystem {
            Subsystem::Cpu => Box::new(CpuMonitor::new(Box::new(LinuxCpu::new()))),
            Subsystem::Screen => Box::new(screen_monitor(config, calibration, screen)),
            Subsystem::Radio => Box::new(radio_monitor(config, calibration)),
            Subsystem::Wifi => Box::new(WifiMonitor::new(
                Arc::clone(calibration),
                WifiConfig {
                    interface: config.wifi_interface.clone(),
                    interval: config.interval(),
                },
                Box::new(LinuxWifiLink::new()),
                Box::new(LinuxNetwork::new()),
                Box::new(LinuxOwners::new()),
            )),
            Subsystem::Gps => Box::new(GpsMonitor::new(
                Box::new(UnavailableGps),
                calibration.gps.sleep_secs,
            )),
            Subsystem::Audio => Box::new(AudioMonitor::new(Box::new(AlsaPlayback::new()))),
            Subsystem::Sensors => Box::new(SensorMonitor::new(Box::new(UnavailableSensors))),
        };
        debug!(subsystem = %subsystem, "Monitor enabled");
        monitors.push(monitor);
    }

    Ok(monitors)
}

fn radio_monitor(config: &UserConfig, calibration: &Arc<Calibration>) -> RadioMonitor {
    let network_type = NetworkType::from_str(&config.network_type);
    if !network_type.is_umts_family() {
        warn!(
            network_type = %network_type,
            "Configured network type is outside the UMTS family, radio will report idle"
        );
    }

    RadioMonitor::new(
        Arc::clone(calibration),
        RadioConfig {
            interface: config.radio_interface.clone(),
            interval: config.interval(),
            max_owner_skips: config.max_owner_skips,
        },
        Box::new(StaticTelephony::new(
            network_type,
            config.operator.clone(),
            &config.radio_interface,
        )),
        Box::new(LinuxNetwork::new()),
        Box::new(LinuxOwners::new()),
    )
}

fn screen_monitor(
    config: &UserConfig,
    calibration: &Arc<Calibration>,
    screen: &ScreenState,
) -> ScreenMonitor {
    let framebuffer = framebuffer_device(config);

    if let Some(device) = &framebuffer {
        let geometry = framebuffer_sysfs(device).and_then(|sysfs| framebuffer_geometry(&sysfs));
        if let Some((width, height)) = geometry {
            let profile = &calibration.screen;
            if (width, height) != (profile.width, profile.height) {
                warn!(
                    framebuffer = %device.display(),
                    width,
                    height,
                    profile_width = profile.width,
                    profile_height = profile.height,
                    "Framebuffer geometry differs from the device profile"
                );
            }
        }
    }

    ScreenMonitor::new(
        Arc::clone(calibration),
        ScreenConfig {
            framebuffer,
            sample_count: config.screen_samples,
            seed: None,
        },
        screen.clone(),
        Box::new(LinuxDisplay::new()),
        Box::new(InvokingUserForeground::new(config.foreground_uid)),
    )
}

/// Follows the framebuffer blank state until `shutdown` fires.
///
/// Hosts without a blank node leave the screen marked on.
pub async fn watch_screen(
    framebuffer: Option<PathBuf>,
    screen: ScreenState,
    mut shutdown: watch::Receiver<bool>,
) {
    let Some(sysfs) = framebuffer.as_deref().and_then(framebuffer_sysfs) else {
        debug!("No framebuffer, screen state stays on");
        return;
    };

    let mut ticker = tokio::time::interval(BLANK_POLL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        if let Some(blanked) = is_blanked(&sysfs) {
            if screen.is_on() == blanked {
                debug!(on = !blanked, "Screen state changed");
            }
            screen.set_on(!blanked);
        }
    }
}
