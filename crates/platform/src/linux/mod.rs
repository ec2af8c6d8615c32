//! sysfs/procfs backed collaborators for Linux and Android kernels.

mod audio;
mod cpu;
mod display;
mod net;
mod owners;
mod session;

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};

pub use audio::AlsaPlayback;
pub use cpu::LinuxCpu;
pub use display::{find_framebuffer, framebuffer_geometry, is_blanked, LinuxDisplay};
pub use net::{LinuxNetwork, LinuxWifiLink};
pub use owners::LinuxOwners;
pub use session::{InvokingUserForeground, StaticTelephony, UnavailableGps, UnavailableSensors};

pub(crate) fn read_trimmed(path: &Path) -> Result<String> {
    let content =
        fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    Ok(content.trim().to_string())
}

pub(crate) fn read_u64(path: &Path) -> Result<u64> {
    let content = read_trimmed(path)?;
    content
        .parse::<u64>()
        .wrap_err_with(|| format!("parsing {} from {}", content, path.display()))
}
