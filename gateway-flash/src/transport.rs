// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Serial transport speaking the AN2606 host side.

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

use gateway_core::protocol::{
    self, address_frame, erase_frame, read_length_frame, write_frame, Command, ACK, NAK, SYNC,
};

/// Default timeout for serial operations in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = protocol::WRITE_TIMEOUT_MS as u64;

/// UART link to the loader (8E1, no flow control).
pub struct Transport {
    port: Box<dyn SerialPort>,
}

impl Transport {
    /// Open the port at `baud` (the loader runs at 115200).
    pub fn with_baud(port_name: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;

        Ok(Self { port })
    }

    /// Get the port name.
    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_else(|| "?".to_string())
    }

    fn drain_rx(&mut self) {
        let mut buf = [0u8; 64];
        let old_timeout = self.port.timeout();
        let _ = self.port.set_timeout(Duration::from_millis(10));
        while self.port.read(&mut buf).unwrap_or(0) > 0 {}
        let _ = self.port.set_timeout(old_timeout);
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        debug!("-> {:02x?}", &bytes[..bytes.len().min(16)]);
        self.port
            .write_all(bytes)
            .map_err(|e| anyhow::anyhow!("Failed to write to serial port: {}", e))?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact_timeout(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<()> {
        let old_timeout = self.port.timeout();
        self.port
            .set_timeout(Duration::from_millis(timeout_ms))
            .map_err(|e| anyhow::anyhow!("Failed to set timeout: {}", e))?;

        let result = self.port.read_exact(buf);

        let _ = self.port.set_timeout(old_timeout);

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                bail!("Timeout waiting for {} bytes", buf.len())
            }
            Err(e) => bail!("Serial read error: {}", e),
        }
    }

    /// Wait for ACK; NAK or anything else is an error naming `what`.
    fn expect_ack(&mut self, what: &str, timeout_ms: u64) -> Result<()> {
        let mut byte = [0u8; 1];
        self.read_exact_timeout(&mut byte, timeout_ms)
            .with_context(|| format!("No reply to {}", what))?;
        debug!("<- {:02x} ({})", byte[0], what);
        match byte[0] {
            ACK => Ok(()),
            NAK => {
                warn!("Loader sent NAK for {}", what);
                bail!("{} rejected (NAK)", what)
            }
            other => bail!("Unexpected reply 0x{:02x} to {}", other, what),
        }
    }

    fn send_command(&mut self, cmd: Command) -> Result<()> {
        self.send(&cmd.header())?;
        self.expect_ack("command header", DEFAULT_TIMEOUT_MS)
    }

    /// Send the sync byte and wait for the loader's ACK.
    pub fn sync(&mut self) -> Result<()> {
        self.drain_rx();
        self.send(&[SYNC])?;
        self.expect_ack("sync", u64::from(protocol::SYNC_TIMEOUT_MS))
    }

    /// Erase the whole partition.
    pub fn erase_all(&mut self) -> Result<()> {
        self.send_command(Command::ExtendedErase)?;
        self.send(&erase_frame(protocol::ERASE_ALL))?;
        self.expect_ack("mass erase", u64::from(protocol::ERASE_TIMEOUT_MS))
    }

    /// Write up to 256 bytes at `address`.
    pub fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let Some(frame) = write_frame(data) else {
            bail!("Chunk of {} bytes cannot be written in one command", data.len());
        };
        self.send_command(Command::WriteMemory)?;
        self.send(&address_frame(address))?;
        self.expect_ack("write address", DEFAULT_TIMEOUT_MS)?;
        self.send(&frame)?;
        self.expect_ack("write data", DEFAULT_TIMEOUT_MS)
    }

    /// Read up to 256 bytes at `address` into `buf`.
    pub fn read_memory(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let Some(len_frame) = read_length_frame(buf.len()) else {
            bail!("Chunk of {} bytes cannot be read in one command", buf.len());
        };
        self.send_command(Command::ReadMemory)?;
        self.send(&address_frame(address))?;
        self.expect_ack("read address", DEFAULT_TIMEOUT_MS)?;
        self.send(&len_frame)?;
        self.expect_ack("read length", DEFAULT_TIMEOUT_MS)?;
        self.read_exact_timeout(buf, u64::from(protocol::READ_TIMEOUT_MS))
    }
}
