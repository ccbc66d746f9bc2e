// crates/trellis-cli/src/commands/config.rs
//
// `trellis config`: print the effective configuration as TOML.

use crate::config::CliConfig;

/// Run the config command.
pub fn run(config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", config.to_toml()?);
    Ok(())
}
