//! `netsentry blocks` command handler.

use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use netsentry_core::types::MitigationTarget;

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `blocks` command: list currently active mitigation blocks.
///
/// Renders from the same JSON contract the daemon publishes, rather than
/// the driver's internal `ActiveBlock`/`RuleHandle` types -- the CLI only
/// needs the fields an operator cares about.
pub async fn execute(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;
    let report: BlocksReport =
        super::read_status_document(Path::new(&config.general.data_dir), "blocks.json").await?;
    writer.render(&report)?;
    Ok(())
}

#[derive(Serialize, Deserialize)]
pub struct BlockView {
    pub target: MitigationTarget,
    pub reason: String,
    pub installed_at: SystemTime,
    pub expires_at: SystemTime,
}

#[derive(Serialize, Deserialize)]
pub struct BlocksReport {
    pub generated_at: SystemTime,
    pub blocks: Vec<BlockView>,
}

fn target_string(target: &MitigationTarget) -> String {
    match target {
        MitigationTarget::Ip(ip) => ip.to_string(),
        MitigationTarget::IpMac(ip, mac) => format!("{ip}/{mac}"),
    }
}

impl Render for BlocksReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.blocks.is_empty() {
            writeln!(w, "No active blocks.")?;
            return Ok(());
        }

        writeln!(w, "{:<24} Reason", "Target")?;
        writeln!(w, "{}", "-".repeat(60))?;
        for b in &self.blocks {
            writeln!(w, "{:<24} {}", target_string(&b.target), b.reason)?;
        }
        Ok(())
    }
}
