//! Gated plain-text RandR debug log
//!
//! When `~/csd-debug-randr` exists, every interesting RandR transition is
//! appended to `~/csd-debug-randr.log`: timestamps, screen state, and full
//! configuration dumps. The toggle file keeps this out of normal sessions
//! while letting users capture a trace for a bug report without restarting
//! anything.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::randr::{Config, ScreenSnapshot};

const TOGGLE_NAME: &str = "csd-debug-randr";
const LOG_NAME: &str = "csd-debug-randr.log";

/// One logging session, opened per handled event.
pub struct DebugLog {
    file: Option<File>,
}

fn home_file(name: &str) -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(name))
}

/// The relationship between two X timestamps: '<', '>' or '='.
pub fn timestamp_relationship(a: u32, b: u32) -> char {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => '<',
        std::cmp::Ordering::Greater => '>',
        std::cmp::Ordering::Equal => '=',
    }
}

impl DebugLog {
    /// Open the log if the toggle file is present; a no-op sink otherwise.
    pub fn open() -> DebugLog {
        let toggled = home_file(TOGGLE_NAME).is_some_and(|p| p.exists());
        if !toggled {
            return DebugLog { file: None };
        }

        let file = home_file(LOG_NAME).and_then(|path| {
            let mut file = OpenOptions::new().create(true).append(true).open(path).ok()?;
            if file.seek(SeekFrom::End(0)).ok() == Some(0) {
                let _ = writeln!(
                    file,
                    "To keep this log from being created, please rm ~/{TOGGLE_NAME}"
                );
            }
            Some(file)
        });

        DebugLog { file }
    }

    /// Whether messages are actually being written.
    pub fn enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append one line.
    pub fn msg(&mut self, line: impl AsRef<str>) {
        if let Some(file) = &mut self.file {
            let _ = writeln!(file, "{}", line.as_ref());
        }
    }

    /// Dump a configuration, one output per line.
    pub fn log_config(&mut self, config: &Config) {
        if !self.enabled() {
            return;
        }
        self.msg(format!("        cloned: {}", if config.clone { "yes" } else { "no" }));
        if config.outputs.is_empty() {
            self.msg("        no outputs!");
            return;
        }
        for output in &config.outputs {
            self.msg(format!("        {output}"));
        }
    }

    /// Dump a whole candidate list.
    pub fn log_configs(&mut self, configs: &[Config]) {
        if !self.enabled() {
            return;
        }
        if configs.is_empty() {
            self.msg("    No configurations");
            return;
        }
        for (i, config) in configs.iter().enumerate() {
            self.msg(format!("    Configuration {i}"));
            self.log_config(config);
        }
    }

    /// Dump the screen bounds, timestamps, and current configuration.
    pub fn log_screen(&mut self, snapshot: &ScreenSnapshot) {
        if !self.enabled() {
            return;
        }
        self.msg(format!(
            "        Screen min({}, {}), max({}, {}), change={} {} config={}",
            snapshot.bounds.min_width,
            snapshot.bounds.min_height,
            snapshot.bounds.max_width,
            snapshot.bounds.max_height,
            snapshot.change_timestamp,
            timestamp_relationship(snapshot.change_timestamp, snapshot.config_timestamp),
            snapshot.config_timestamp,
        ));
        self.log_config(&Config::new_current(snapshot));
    }
}
