//! `netsentry status` command handler.

use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `status` command: read and render the daemon's periodic
/// status document.
pub async fn execute(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;
    let report: StatusReport =
        super::read_status_document(Path::new(&config.general.data_dir), "status.json").await?;
    writer.render(&report)?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
pub struct ModuleStatus {
    pub name: String,
    pub enabled: bool,
}

#[derive(Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    pub generated_at: SystemTime,
    pub uptime_secs: u64,
    pub threats_open: usize,
    pub active_blocks: usize,
    pub modules: Vec<ModuleStatus>,
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Daemon: {} (uptime: {}s)",
            if self.running { "running".green().bold() } else { "not running".red().bold() },
            self.uptime_secs
        )?;
        writeln!(w, "Open threats: {}", self.threats_open)?;
        writeln!(w, "Active blocks: {}", self.active_blocks)?;
        writeln!(w)?;
        writeln!(w, "{:<24} Enabled", "Module")?;
        writeln!(w, "{}", "-".repeat(40))?;
        for m in &self.modules {
            writeln!(w, "{:<24} {}", m.name, if m.enabled { "yes" } else { "no" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_text_shows_running_state() {
        let report = StatusReport {
            running: true,
            generated_at: SystemTime::now(),
            uptime_secs: 42,
            threats_open: 2,
            active_blocks: 1,
            modules: vec![ModuleStatus { name: "ddos-detector".to_owned(), enabled: true }],
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("running"));
        assert!(output.contains("ddos-detector"));
        assert!(output.contains("Open threats: 2"));
    }

    #[test]
    fn json_roundtrip_preserves_fields() {
        let report = StatusReport {
            running: false,
            generated_at: SystemTime::now(),
            uptime_secs: 0,
            threats_open: 0,
            active_blocks: 0,
            modules: Vec::new(),
        };
        let json = serde_json::to_string(&report).unwrap();
        let parsed: StatusReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.running, false);
    }
}
