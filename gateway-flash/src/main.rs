// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host tool for the gateway's external-flash loader (AN2606 over UART).
//!
//! Usage:
//!   gateway-flash --port /dev/ttyUSB0 erase
//!   gateway-flash --port /dev/ttyUSB0 write app.bin --skip-header 1024 --erase --verify
//!   gateway-flash --port /dev/ttyUSB0 read --address 0x90000000 --length 4096 --output dump.bin

mod cli;
mod commands;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::Cli::parse();
    cli::run(args)
}
