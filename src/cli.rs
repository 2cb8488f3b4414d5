//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "microboot")]
#[command(author, version, about = "Bootloader core simulator", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Device profile file (TOML format); defaults to the generic
    /// dual-bank device
    #[arg(long, global = true)]
    pub profile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the device profile, memory map and command set
    Info,

    /// Run a scripted host session against the emulated device
    Session {
        /// Page indices to erase, comma separated
        #[arg(long, value_delimiter = ',', default_value = "5")]
        erase: Vec<u16>,

        /// Hex bytes to program at the first erased page
        #[arg(long, default_value = "deadbeefcafe")]
        data: String,

        /// Program at this address instead of the first erased page
        #[arg(long, value_parser = parse_hex_u32)]
        address: Option<u32>,
    },
}
