pub mod analyze;
pub mod init;
pub mod normalize;
pub mod similarity;
pub mod stats;

use std::path::{Path, PathBuf};

use anyhow::Result;

use examforge_core::config::{load_config_from, AnalysisConfig};

/// Output formats shared by the single-report commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

impl Format {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => anyhow::bail!("unknown format '{other}' (expected text or json)"),
        }
    }
}

pub fn load_config(path: Option<PathBuf>) -> Result<AnalysisConfig> {
    load_config_from(path.as_deref())
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn report_saved(path: &Path) {
    eprintln!("Report saved to: {}", path.display());
}
