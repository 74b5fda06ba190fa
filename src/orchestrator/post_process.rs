//! Post-harvest processing.
//!
//! Handles exports once the controller has exited with its final roster and result.

use super::controller::ControllerSnapshot;
use crate::metrics::{compute_roster_metrics, RosterMetrics};
use crate::model::{CompanyList, HarvestResult};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Document written by `--export-json`.
#[derive(Debug, Serialize)]
pub(crate) struct ExportDocument<'a> {
    pub exported_at_utc: String,
    pub result: Option<&'a HarvestResult>,
    pub lists: &'a [CompanyList],
    pub metrics: RosterMetrics,
}

/// Result of post-harvest processing, ready for presentation layers.
pub(crate) struct ProcessedHarvest {
    pub export_messages: Vec<String>,
    pub exported_path: Option<PathBuf>,
}

/// Process a finished controller run: write the optional export.
pub(crate) fn process_harvest_completion(
    export_json: Option<&Path>,
    snapshot: &ControllerSnapshot,
) -> ProcessedHarvest {
    let mut export_messages = Vec::new();
    let mut exported_path = None;

    if let Some(path) = export_json {
        match export_snapshot(path, snapshot) {
            Ok(()) => {
                export_messages.push(format!("Exported JSON: {}", path.display()));
                exported_path = Some(path.to_path_buf());
            }
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedHarvest {
        export_messages,
        exported_path,
    }
}

fn export_snapshot(path: &Path, snapshot: &ControllerSnapshot) -> Result<()> {
    let lists = snapshot.roster.lists();
    let doc = ExportDocument {
        exported_at_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        result: snapshot.last_result.as_ref(),
        lists,
        metrics: compute_roster_metrics(lists),
    };
    let body = serde_json::to_string_pretty(&doc).context("serialize export")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
