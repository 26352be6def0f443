// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Endpoint configuration.
//!
//! Defaults come from the build-time features (`can-fd`, `loopback`). A
//! [`GatewayConfig`] can also be persisted in a flash area and read back at
//! boot with [`GatewayConfig::load_or_default`].

use crc::{Crc, CRC_32_ISO_HDLC};
use heapless::String;
use serde::{Deserialize, Serialize};

use crate::drivers::{FlashArea, UartConfig};
use crate::error::{Errno, Error};
use crate::protocol::DEFAULT_PARTITION;

/// Maximum length of device, interface and partition names.
pub const NAME_LEN: usize = 16;

pub type Name = String<NAME_LEN>;

fn name(s: &str) -> Name {
    let mut n = Name::new();
    for c in s.chars() {
        if n.push(c).is_err() {
            break;
        }
    }
    n
}

// --- CAN ---

pub const RX_THREAD_PRIORITY: i32 = 2;
pub const RX_THREAD_STACK_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanConfig {
    /// Use CAN-FD frames with bit rate switching.
    pub fd_mode: bool,
    /// Put the controller in loopback mode.
    pub loopback: bool,
    pub rx_thread_priority: i32,
    pub rx_thread_stack_size: usize,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            fd_mode: cfg!(feature = "can-fd"),
            loopback: cfg!(feature = "loopback"),
            rx_thread_priority: RX_THREAD_PRIORITY,
            rx_thread_stack_size: RX_THREAD_STACK_SIZE,
        }
    }
}

// --- Loader ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub uart: UartConfig,
    /// Flash partition label.
    pub partition: Name,
    /// Acknowledge sector-list erase codes without erasing (not AN2606 compliant).
    pub sector_erase_shim: bool,
    /// Delay between empty UART polls; 0 busy-polls.
    pub poll_interval_us: u32,
    /// Settle time before the UART is reconfigured.
    pub startup_delay_ms: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            uart: UartConfig::AN2606,
            partition: name(DEFAULT_PARTITION),
            sector_erase_shim: true,
            poll_interval_us: 0,
            startup_delay_ms: 100,
        }
    }
}

// --- Modbus ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModbusConfig {
    pub unit_id: u8,
    pub serial: UartConfig,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            unit_id: 1,
            serial: UartConfig::MODBUS_RTU,
        }
    }
}

// --- Gateway ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub can_device: Name,
    pub can: CanConfig,
    pub modbus_iface: Name,
    pub modbus: ModbusConfig,
    pub loader: LoaderConfig,
    /// Run a loader session of this many idle seconds before the endpoints start.
    pub loader_timeout_sec: Option<u32>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            can_device: name("canbus0"),
            can: CanConfig::default(),
            modbus_iface: name("modbus0"),
            modbus: ModbusConfig::default(),
            loader: LoaderConfig::default(),
            loader_timeout_sec: None,
        }
    }
}

// --- Persistence ---

pub const CONFIG_MAGIC: u32 = 0x6A7E_C0F1;

/// magic (4) + payload length (2) + CRC32 of payload (4)
pub const HEADER_LEN: usize = 10;

pub const MAX_PAYLOAD_LEN: usize = 256;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

impl GatewayConfig {
    /// Read a stored configuration, falling back to defaults if none is valid.
    pub fn load_or_default<A: FlashArea>(area: &mut A) -> Self {
        match load(area) {
            Some(config) => config,
            None => {
                info!("No stored configuration, using defaults");
                Self::default()
            }
        }
    }
}

/// Read the record at the start of `area`.
///
/// Returns `None` if the magic, length, CRC or payload is invalid.
pub fn load<A: FlashArea>(area: &mut A) -> Option<GatewayConfig> {
    let mut header = [0u8; HEADER_LEN];
    area.read(0, &mut header).ok()?;

    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != CONFIG_MAGIC {
        return None;
    }
    let len = u16::from_le_bytes([header[4], header[5]]) as usize;
    if len == 0 || len > MAX_PAYLOAD_LEN {
        warn!("Stored configuration has bad length {}", len);
        return None;
    }
    let crc = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);

    let mut payload = [0u8; MAX_PAYLOAD_LEN];
    area.read(HEADER_LEN as u32, &mut payload[..len]).ok()?;
    if CRC32.checksum(&payload[..len]) != crc {
        warn!("Stored configuration CRC mismatch");
        return None;
    }

    postcard::from_bytes(&payload[..len]).ok()
}

/// Erase `area` and write `config` as a new record.
pub fn store<A: FlashArea>(area: &mut A, config: &GatewayConfig) -> Result<(), Error> {
    let mut record = [0u8; HEADER_LEN + MAX_PAYLOAD_LEN];
    let len = postcard::to_slice(config, &mut record[HEADER_LEN..])
        .map_err(|_| Error::from(Errno::EINVAL))?
        .len();
    let crc = CRC32.checksum(&record[HEADER_LEN..HEADER_LEN + len]);

    record[0..4].copy_from_slice(&CONFIG_MAGIC.to_le_bytes());
    record[4..6].copy_from_slice(&(len as u16).to_le_bytes());
    record[6..10].copy_from_slice(&crc.to_le_bytes());

    let size = area.size();
    area.erase(0, size)?;
    area.write(0, &record[..HEADER_LEN + len])?;
    debug!("Stored configuration ({} bytes)", len);
    Ok(())
}
