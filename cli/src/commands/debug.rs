use bytesize::ByteSize;
use color_eyre::eyre::Result;
use drainwatch_platform::linux::{
    framebuffer_geometry, is_blanked, AlsaPlayback, LinuxCpu, LinuxDisplay, LinuxNetwork,
    LinuxOwners, LinuxWifiLink,
};
use drainwatch_platform::{
    AudioSource, CpuCounters, DisplaySource, NetworkCounters, NetworkType, OwnerSource, WifiLink,
};
use sysinfo::System;

use crate::config::{config_path, UserConfig};
use crate::{logging, sources};

pub fn run(config: &UserConfig) -> Result<()> {
    println!("drainwatch debug information");
    println!("{}", "=".repeat(60));

    println!("\n--- System Info ---");
    println!("OS: {}", System::long_os_version().unwrap_or_else(|| "Unknown".to_string()));
    println!("Kernel: {}", System::kernel_version().unwrap_or_else(|| "Unknown".to_string()));
    println!("Host: {}", System::host_name().unwrap_or_else(|| "Unknown".to_string()));
    println!("Generated: {}", chrono::Local::now().to_rfc3339());

    println!("\n--- CPU ---");
    let cpu = LinuxCpu::new();
    match cpu.frequency_mhz() {
        Ok(mhz) => println!("Frequency: {:.0} MHz", mhz),
        Err(e) => println!("Frequency: unavailable ({})", e),
    }
    match cpu.system_times() {
        Ok(times) => println!(
            "Ticks: user {} / system {} / total {}",
            times.user, times.system, times.total
        ),
        Err(e) => println!("Ticks: unavailable ({})", e),
    }

    println!("\n--- Display ---");
    let display = LinuxDisplay::new();
    match display.backlight_path() {
        Some(path) => println!("Backlight: {}", path.display()),
        None => println!("Backlight: not found"),
    }
    println!("Brightness: {}", display.brightness());
    match sources::framebuffer_device(config) {
        Some(device) => {
            println!("Framebuffer: {}", device.display());
            if let Some(sysfs) = sources::framebuffer_sysfs(&device) {
                if let Some((width, height)) = framebuffer_geometry(&sysfs) {
                    println!("Geometry: {}x{}", width, height);
                }
                if let Some(blanked) = is_blanked(&sysfs) {
                    println!("Blanked: {}", blanked);
                }
            }
        }
        None => println!("Framebuffer: not found"),
    }

    println!("\n--- Network ---");
    let network = LinuxNetwork::new();
    println!(
        "Network type: {} (UMTS family: {})",
        NetworkType::from_str(&config.network_type),
        NetworkType::from_str(&config.network_type).is_umts_family()
    );
    for iface in [&config.radio_interface, &config.wifi_interface] {
        match network.interface_counters(iface) {
            Ok(counters) => println!(
                "{}: {} packets, tx {}, rx {}",
                iface,
                counters.packets(),
                ByteSize::b(counters.tx_bytes),
                ByteSize::b(counters.rx_bytes)
            ),
            Err(e) => println!("{}: unavailable ({})", iface, e),
        }
    }
    match LinuxWifiLink::new().link(&config.wifi_interface) {
        Ok(link) => println!(
            "Wi-Fi link: enabled {} at {:.1} Mbps",
            link.enabled, link.speed_mbps
        ),
        Err(e) => println!("Wi-Fi link: unavailable ({})", e),
    }
    println!("Per-owner counters: {}", network.has_owner_counters());
    match LinuxOwners::new().list_active_owners() {
        Ok(owners) => {
            let count = owners.iter().take_while(|uid| **uid >= 0).count();
            println!("Active owners: {}", count);
        }
        Err(e) => println!("Active owners: unavailable ({})", e),
    }

    println!("\n--- Audio ---");
    match AlsaPlayback::new().is_playing() {
        Ok(playing) => println!("Playing: {}", playing),
        Err(e) => println!("Playing: unavailable ({})", e),
    }

    println!("\n--- Device Profile ---");
    match config.profile.as_deref() {
        Some(_) => match sources::load_calibration(config) {
            Ok(calibration) => println!(
                "Model: {} ({:?} {}x{})",
                calibration.model,
                calibration.screen.technology,
                calibration.screen.width,
                calibration.screen.height
            ),
            Err(e) => println!("Invalid: {:#}", e),
        },
        None => println!("Not configured"),
    }

    println!("\n--- Config Paths ---");
    println!("Config: {}", config_path().display());
    println!("Logs: {}", logging::log_dir().display());

    println!("\n--- Current Config ---");
    println!("{}", toml::to_string_pretty(config)?);

    Ok(())
}
