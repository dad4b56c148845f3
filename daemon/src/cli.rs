use clap::Parser;
use std::path::PathBuf;

use crate::config::Settings;
use crate::paths;

/// Listen to ACPI events and spawn specific helpers on event arrival.
///
/// Without -e, all /dev/input/event* devices are used.
#[derive(Debug, Parser)]
#[command(name = "acpid", version)]
pub struct Args {
    /// Handler directory [/etc/acpi]
    #[arg(short = 'c', value_name = "DIR")]
    pub conf_dir: Option<PathBuf>,

    /// Debug logging; echo each resolved event
    #[arg(short = 'd')]
    pub debug: bool,

    /// Textual event file, e.g. /proc/acpi/event
    #[arg(short = 'e', value_name = "FILE")]
    pub event_file: Option<PathBuf>,

    /// Action file [/etc/acpid.conf]
    #[arg(short = 'a', value_name = "FILE")]
    pub action_file: Option<PathBuf>,

    /// Map file [/etc/acpi.map]
    #[arg(short = 'M', value_name = "FILE")]
    pub map_file: Option<PathBuf>,

    /// Pid file [/var/run/acpid.pid]
    #[arg(short = 'p', value_name = "FILE")]
    pub pid_file: Option<PathBuf>,

    /// Settings file [/etc/acpid.toml]
    #[arg(long = "config", value_name = "FILE")]
    pub settings: Option<PathBuf>,

    // Accepted for compatibility with other acpid implementations; ignored.
    // The daemon always runs in the foreground and logs to stderr.
    #[arg(short = 'f', hide = true)]
    #[allow(dead_code)]
    compat_f: bool,
    #[arg(short = 'l', hide = true, value_name = "FILE")]
    #[allow(dead_code)]
    compat_l: Option<String>,
    #[arg(short = 'g', hide = true)]
    #[allow(dead_code)]
    compat_g: Option<String>,
    #[arg(short = 'm', hide = true)]
    #[allow(dead_code)]
    compat_m: Option<String>,
    #[arg(short = 's', hide = true)]
    #[allow(dead_code)]
    compat_s: Option<String>,
    #[arg(short = 'S', hide = true)]
    #[allow(dead_code)]
    compat_upper_s: Option<String>,
    #[arg(short = 'v', hide = true)]
    #[allow(dead_code)]
    compat_v: bool,
}

impl Args {
    pub fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(paths::settings_file_path)
    }

    /// Overrides `settings` with every flag given on the command line.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.conf_dir {
            settings.conf_dir = dir.clone();
        }
        if let Some(file) = &self.event_file {
            settings.event_file = Some(file.clone());
        }
        if let Some(file) = &self.action_file {
            settings.action_file = file.clone();
        }
        if let Some(file) = &self.map_file {
            settings.map_file = file.clone();
        }
        if let Some(file) = &self.pid_file {
            settings.pid_file = file.clone();
        }
        if self.debug {
            settings.debug = true;
        }
    }
}
