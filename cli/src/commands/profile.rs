use std::path::Path;

use color_eyre::eyre::Result;
use drainwatch_engine::{Calibration, RadioTiming};

/// Validates a device profile and prints what the estimator will use.
pub fn run(path: &Path, interval_ms: u64) -> Result<()> {
    let calibration = Calibration::from_path(path)?;

    println!("Profile: {}", path.display());
    println!("Model: {}", calibration.model);
    println!("{}", "=".repeat(60));

    println!("\n--- CPU ---");
    for (mhz, ratio) in calibration
        .cpu
        .frequencies_mhz
        .iter()
        .zip(&calibration.cpu.ratios)
    {
        println!("{:>8.1} MHz  {:.6} W/%", mhz, ratio);
    }

    println!("\n--- Screen ---");
    let screen = &calibration.screen;
    println!(
        "{:?} {}x{} ({} pixels)",
        screen.technology,
        screen.width,
        screen.height,
        screen.pixel_count()
    );

    println!("\n--- Radio ---");
    print_radio("default", &calibration, None, interval_ms);
    for provider in calibration.radio.providers.keys() {
        print_radio(provider, &calibration, Some(provider.as_str()), interval_ms);
    }

    println!("\n--- Wi-Fi ---");
    let wifi = &calibration.wifi;
    println!("Low {:.3} W / High {:.3} W", wifi.low_watts, wifi.high_watts);
    println!(
        "Packet thresholds: up {} / down {} per second",
        wifi.low_high_packets, wifi.high_low_packets
    );

    println!("\n--- GPS / Audio ---");
    println!("GPS off/sleep/on: {:?} W", calibration.gps.state_watts);
    println!("GPS sleep: {} s", calibration.gps.sleep_secs);
    println!("Audio: {:.3} W", calibration.audio.watts);

    if !calibration.sensors.is_empty() {
        println!("\n--- Sensors ---");
        for (name, watts) in &calibration.sensors {
            println!("{:<24} {:.4} W", name, watts);
        }
    }

    println!("\nProfile is valid.");
    Ok(())
}

fn print_radio(label: &str, calibration: &Calibration, provider: Option<&str>, interval_ms: u64) {
    let profile = calibration.radio_profile(provider);
    let RadioTiming {
        dch_fach_secs,
        fach_idle_secs,
        tx_queue,
        rx_queue,
    } = calibration.radio_timing(provider);

    println!(
        "{}: idle {:.3} W, fach {:.3} W, dch {:.3} W",
        label, profile.idle_watts, profile.fach_watts, profile.dch_watts
    );
    println!(
        "  demote after {}s dch / {}s fach ({} / {} iterations at {} ms), queues tx {} rx {}",
        dch_fach_secs,
        fach_idle_secs,
        dwell_iterations(dch_fach_secs, interval_ms),
        dwell_iterations(fach_idle_secs, interval_ms),
        interval_ms,
        tx_queue,
        rx_queue
    );
}

fn dwell_iterations(secs: f64, interval_ms: u64) -> u32 {
    drainwatch_engine::monitor::dwell_iterations(secs, std::time::Duration::from_millis(interval_ms))
}
