// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Protocol core for the gateway firmware.
//!
//! Three independent endpoints share one microcontroller:
//! - [`canbus`]: ISO-TP data channel over CAN / CAN-FD
//! - [`loader`]: AN2606 UART loader programming the external NOR partition
//! - [`modbus`]: Modbus-RTU holding registers backed by externally owned cells
//!
//! Hardware and RTOS services are reached through the traits in [`drivers`].
//!
//! Features:
//! - Default: `no_std` mode for embedded targets
//! - `std`: `std::error::Error` support for host tools
//! - `log` / `defmt`: logging backend (at most one)
//! - `can-fd` / `loopback`: build-time CAN switches

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod bridge;
pub mod canbus;
pub mod config;
pub mod drivers;
pub mod error;
pub mod gateway;
pub mod loader;
pub mod modbus;
pub mod protocol;

pub use config::{CanConfig, GatewayConfig, LoaderConfig, ModbusConfig};
pub use error::{Errno, Error};
pub use loader::{ext_flash_loader_start, ExtFlashLoader, LoaderStats};
pub use modbus::{HoldingRegisters, ModbusSlave, HOLDING_REG_COUNT};
