//! Summary of a full experiment suite.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};

use super::runner::SuiteEntry;

/// Render the suite summary text
pub fn render_suite_summary(entries: &[SuiteEntry], generated_on: &str) -> String {
    let mut lines = vec![
        "Multi-Service Network QoS Experiment Summary".to_string(),
        "=".repeat(50),
        format!("Generated on: {}", generated_on),
        String::new(),
        "Experiment Results:".to_string(),
        "-".repeat(30),
    ];
    for entry in entries {
        match &entry.error {
            None => lines.push(format!("{} ({}): SUCCESS", entry.run_id, entry.label)),
            Some(error) => lines.push(format!("{} ({}): FAILED - {}", entry.run_id, entry.label, error)),
        }
    }
    lines.push(String::new());
    lines.push("For detailed results, check the individual run directories.".to_string());

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Write `experiment_summary.txt` into the results directory
pub fn write_suite_summary(results_dir: &Path, entries: &[SuiteEntry], generated_on: &str) -> Result<PathBuf> {
    fs::create_dir_all(results_dir)
        .with_context(|| format!("Failed to create results directory {}", results_dir.display()))?;
    let path = results_dir.join("experiment_summary.txt");
    fs::write(&path, render_suite_summary(entries, generated_on))
        .with_context(|| format!("Failed to write suite summary to {}", path.display()))?;
    Ok(path)
}
