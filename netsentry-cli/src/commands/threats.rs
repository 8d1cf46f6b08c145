//! `netsentry threats` command handler.

use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use netsentry_core::types::Threat;

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `threats` command: list currently open threats.
pub async fn execute(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;
    let report: ThreatsReport =
        super::read_status_document(Path::new(&config.general.data_dir), "threats.json").await?;
    writer.render(&report)?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
pub struct ThreatsReport {
    pub generated_at: SystemTime,
    pub threats: Vec<Threat>,
}

impl Render for ThreatsReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.threats.is_empty() {
            writeln!(w, "No open threats.")?;
            return Ok(());
        }

        writeln!(w, "{:<16} {:<20} {:<10} Source", "Kind", "First Seen", "Severity")?;
        writeln!(w, "{}", "-".repeat(72))?;
        for t in &self.threats {
            let severity = format!("{:?}", t.severity);
            let severity_colored = match t.severity {
                netsentry_core::types::Severity::Critical | netsentry_core::types::Severity::High => {
                    severity.red().bold()
                }
                netsentry_core::types::Severity::Medium => severity.yellow(),
                netsentry_core::types::Severity::Low => severity.normal(),
            };
            let first_seen = t
                .first_seen
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs().to_string())
                .unwrap_or_else(|_| "unknown".to_owned());
            writeln!(w, "{:<16?} {:<20} {:<10} {}", t.kind, first_seen, severity_colored, t.source_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_text_reports_no_threats_when_empty() {
        let report = ThreatsReport { generated_at: SystemTime::now(), threats: Vec::new() };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("No open threats"));
    }
}
