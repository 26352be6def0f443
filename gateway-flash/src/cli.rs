// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gateway_core::protocol::FLASH_BASE;

use crate::commands;
use crate::transport::Transport;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "gateway-flash")]
#[command(about = "External flash programmer for the gateway loader")]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyUSB0)
    #[arg(short, long)]
    pub port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    pub baud: u32,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Check that the loader answers the sync byte
    Sync,

    /// Erase the whole external flash partition
    Erase,

    /// Program an image into external flash
    Write {
        /// Image file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Target bus address
        #[arg(short, long, default_value_t = FLASH_BASE, value_parser = parse_address)]
        address: u32,

        /// Bytes to drop from the start of the image (1024 for MCUboot-padded images)
        #[arg(long, default_value = "0")]
        skip_header: usize,

        /// Mass erase before writing
        #[arg(long)]
        erase: bool,

        /// Read back and compare CRC32 after writing
        #[arg(long)]
        verify: bool,
    },

    /// Dump external flash to a file
    Read {
        /// Source bus address
        #[arg(short, long, default_value_t = FLASH_BASE, value_parser = parse_address)]
        address: u32,

        /// Number of bytes to read
        #[arg(short, long)]
        length: usize,

        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

/// Parse a decimal or `0x`-prefixed hexadecimal address.
fn parse_address(s: &str) -> Result<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16)
            .with_context(|| format!("Invalid hex address {}", s)),
        None => s
            .parse()
            .with_context(|| format!("Invalid address {}", s)),
    }
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let mut transport = Transport::with_baud(&cli.port, cli.baud)?;

    match cli.command {
        Commands::Sync => commands::sync(&mut transport),
        Commands::Erase => {
            commands::sync(&mut transport)?;
            commands::erase(&mut transport)
        }
        Commands::Write {
            file,
            address,
            skip_header,
            erase,
            verify,
        } => {
            commands::sync(&mut transport)?;
            commands::write(&mut transport, &file, address, skip_header, erase, verify)
        }
        Commands::Read {
            address,
            length,
            output,
        } => {
            commands::sync(&mut transport)?;
            commands::read(&mut transport, address, length, &output)
        }
    }
}
