/// Default locations of the files the daemon reads and writes.
///
///   - /etc/acpid.toml       optional settings file
///   - /etc/acpid.conf       action table
///   - /etc/acpi.map         event map
///   - /etc/acpi/            handler root
///   - /dev/input/eventN     binary event sources
///   - /var/run/acpid.pid    pid marker
use std::path::PathBuf;

pub const SETTINGS_FILE: &str = "/etc/acpid.toml";
pub const CONF_DIR: &str = "/etc/acpi";
pub const ACTION_FILE: &str = "/etc/acpid.conf";
pub const MAP_FILE: &str = "/etc/acpi.map";
pub const INPUT_PREFIX: &str = "/dev/input/event";
pub const PID_FILE: &str = "/var/run/acpid.pid";
pub const RUN_PARTS: &str = "run-parts";

pub fn settings_file_path() -> PathBuf {
    PathBuf::from(SETTINGS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_files_live_under_etc() {
        for p in [SETTINGS_FILE, ACTION_FILE, MAP_FILE, CONF_DIR] {
            assert!(PathBuf::from(p).starts_with("/etc"), "{p}");
        }
    }

    #[test]
    fn input_prefix_is_indexed_by_appending() {
        assert_eq!(format!("{INPUT_PREFIX}{}", 0), "/dev/input/event0");
    }
}
