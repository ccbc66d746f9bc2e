// crates/trellis-cli/src/commands/mod.rs
//
// Command module declarations for the Trellis CLI.

pub mod config;
pub mod run;
