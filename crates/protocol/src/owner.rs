//! Human-readable names for owner identifiers.

use crate::types::Uid;

/// First identifier handed to installed applications.
pub const FIRST_APPLICATION_UID: i32 = 10_000;

// Fixed system identifiers from android_filesystem_config.h.
const KNOWN_OWNERS: &[(i32, &str)] = &[
    (0, "Kernel"),
    (1000, "System"),
    (1001, "Radio service"),
    (1002, "Bluetooth"),
    (1003, "Graphics"),
    (1004, "Input service"),
    (1005, "Audio service"),
    (1006, "Camera service"),
    (1007, "Log service"),
    (1008, "Compass service"),
    (1009, "Mount service"),
    (1010, "Wifi service"),
    (1011, "Android Debug Bridge"),
    (1012, "Install"),
    (1013, "Media server"),
    (1014, "DHCP client"),
    (2000, "Shell client"),
    (2001, "Cache access"),
    (2002, "Diagnostics"),
];

/// Returns a display label for `uid`.
///
/// Package lookup is left to the reporting side; unknown identifiers get a
/// `sys_` or `app_` prefix depending on which range they fall in.
pub fn owner_label(uid: Uid) -> String {
    if uid == Uid::SYSTEM {
        return "Device".to_string();
    }

    if let Some((_, name)) = KNOWN_OWNERS.iter().find(|(raw, _)| *raw == uid.as_raw()) {
        return (*name).to_string();
    }

    if uid.as_raw() < FIRST_APPLICATION_UID {
        format!("sys_{}", uid)
    } else {
        format!("app_{}", uid)
    }
}
