//! The `examforge init` command.

use anyhow::Result;

use examforge_core::AnalysisConfig;

const CONFIG_FILE: &str = "examforge.toml";

const HEADER: &str = "# examforge configuration
#
# Every value below is the built-in default. Delete what you do not need
# to change; missing keys fall back to the defaults.

";

pub fn execute() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);
    if path.exists() {
        println!("{CONFIG_FILE} already exists, skipping.");
        return Ok(());
    }

    std::fs::write(path, starter_config()?)?;
    println!("Created {CONFIG_FILE}");

    println!("\nNext steps:");
    println!("  1. Adjust thresholds and bands in {CONFIG_FILE}");
    println!("  2. Run: examforge similarity --input paper.txt");
    println!("  3. Run: examforge stats --input paper.txt --responses responses.csv --key \"1:C,2:A\"");

    Ok(())
}

fn starter_config() -> Result<String> {
    Ok(format!(
        "{HEADER}{}",
        toml::to_string_pretty(&AnalysisConfig::default())?
    ))
}
