// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! External-flash loader speaking a subset of the AN2606 UART protocol.
//!
//! Session flow:
//! - Open: configure the UART (8E1) and open the NOR partition
//! - Sync: wait for 0x7F, answer ACK
//! - Command loop: Extended Erase (0x44), Write Memory (0x31), Read Memory (0x11)
//! - Close: release the partition
//!
//! The session ends when the host stays silent for the idle timeout or for
//! the command timeout, whichever comes first.

use snafu::{ensure, OptionExt};

use crate::config::LoaderConfig;
use crate::drivers::{Clock, FlashArea, FlashMap, Uart};
use crate::error::{to_errno, Error, IoSnafu, NotSupportedSnafu, OutOfRangeSnafu, TimeoutSnafu};
use crate::protocol::{self, Command, ACK, ERASE_ALL, MAX_CHUNK_SIZE, NAK, SYNC};

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Commands whose header was acknowledged.
    pub commands: u32,
    pub naks: u32,
    pub bytes_written: u32,
    pub bytes_read: u32,
}

/// Loader owning its UART for the duration of a session.
pub struct ExtFlashLoader<U, C> {
    uart: U,
    clock: C,
    config: LoaderConfig,
    last_activity_time: i64,
    stats: LoaderStats,
}

impl<U: Uart, C: Clock> ExtFlashLoader<U, C> {
    pub fn new(uart: U, clock: C, config: LoaderConfig) -> Self {
        Self {
            uart,
            clock,
            config,
            last_activity_time: 0,
            stats: LoaderStats::default(),
        }
    }

    /// Uptime of the last byte received.
    pub fn last_activity_time(&self) -> i64 {
        self.last_activity_time
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats
    }

    /// Run one blocking session against the configured partition.
    ///
    /// Returns `Err(Error::Timeout)` when the host goes quiet, which is the
    /// usual way a session ends.
    pub fn start<M: FlashMap>(&mut self, flash_map: &mut M, timeout_sec: u32) -> Result<(), Error> {
        info!("=== External Flash Loader ===");
        info!("Timeout: {} s", timeout_sec);

        self.clock.delay_ms(self.config.startup_delay_ms);

        if let Err(e) = self.uart.configure(&self.config.uart) {
            error!("Failed to configure UART: {}", e);
            return Err(e.into());
        }

        let mut area = match flash_map.open(self.config.partition.as_str()) {
            Ok(area) => area,
            Err(e) => {
                error!("Failed to open flash partition: {}", e);
                return Err(e.into());
            }
        };
        info!(
            "Flash partition: offset {:#x}, size {:#x}",
            area.offset(),
            area.size()
        );

        self.stats = LoaderStats::default();
        self.last_activity_time = self.clock.uptime_ms();

        let result = self.run_session(&mut area, timeout_sec);

        flash_map.close(area);

        match &result {
            Ok(()) => info!("Loader session complete"),
            Err(e) => info!("Loader session ended: {}", e),
        }
        info!("=== External Flash Loader Exit ===");
        result
    }

    fn run_session<A: FlashArea>(&mut self, area: &mut A, timeout_sec: u32) -> Result<(), Error> {
        self.wait_for_sync()?;

        let idle_timeout_ms = i64::from(timeout_sec) * 1000;
        loop {
            let idle = self.clock.uptime_ms() - self.last_activity_time;
            if idle > idle_timeout_ms {
                info!("Idle timeout");
                return TimeoutSnafu.fail();
            }

            // Never wait past the idle deadline for the next command.
            let remaining = (idle_timeout_ms - idle).clamp(0, i64::from(protocol::CMD_TIMEOUT_MS));
            let cmd = match self.receive_byte(remaining as u32) {
                Ok(b) => b,
                Err(e) => {
                    info!("No command received");
                    return Err(e);
                }
            };

            let complement = match self.receive_byte(protocol::COMPLEMENT_TIMEOUT_MS) {
                Ok(b) => b,
                Err(_) => {
                    warn!("Timeout waiting for complement of {:#x}", cmd);
                    self.send_nak();
                    continue;
                }
            };
            if !protocol::is_complement(cmd, complement) {
                warn!("Bad complement: cmd {:#x}, complement {:#x}", cmd, complement);
                self.send_nak();
                continue;
            }

            self.send_ack();
            self.stats.commands += 1;

            if let Err(e) = self.handle_command(area, cmd) {
                error!("Command {:#x} failed: {}", cmd, e);
            }
        }
    }

    /// Dispatch an acknowledged command to its handler.
    fn handle_command<A: FlashArea>(&mut self, area: &mut A, cmd: u8) -> Result<(), Error> {
        match Command::try_from(cmd) {
            Ok(Command::ExtendedErase) => self.handle_extended_erase(area),
            Ok(Command::WriteMemory) => self.handle_write_memory(area),
            Ok(Command::ReadMemory) => self.handle_read_memory(area),
            Err(unknown) => {
                warn!("Unknown command {:#x}", unknown);
                self.send_nak();
                NotSupportedSnafu.fail()
            }
        }
    }

    /// Handle Extended Erase: only the full-erase code touches flash.
    fn handle_extended_erase<A: FlashArea>(&mut self, area: &mut A) -> Result<(), Error> {
        let mut frame = [0u8; 3];
        self.nak_on_err(|l| l.receive_bytes(&mut frame, protocol::WRITE_TIMEOUT_MS))?;

        let Some(code) = protocol::parse_erase_frame(&frame) else {
            warn!("Erase checksum mismatch");
            self.send_nak();
            return IoSnafu.fail();
        };

        if code == ERASE_ALL {
            info!("Mass erase: {:#x} bytes", area.size());
            let size = area.size();
            if let Err(e) = area.erase(0, size) {
                error!("Mass erase failed: {}", e);
                self.send_nak();
                return Err(e.into());
            }
            self.send_ack();
            return Ok(());
        }

        if !self.config.sector_erase_shim {
            warn!("Sector erase {:#x} not supported", code);
            self.send_nak();
            return NotSupportedSnafu.fail();
        }

        // Sector lists are acknowledged without erasing. The host follows up
        // with trailing list bytes that must not be read as a command.
        debug!("Sector erase {:#x} acknowledged without erasing", code);
        self.clock.delay_ms(5);
        while self.uart.poll_in().is_some() {}
        self.send_ack();
        Ok(())
    }

    /// Handle Write Memory: address frame, then `N`, data and checksum.
    fn handle_write_memory<A: FlashArea>(&mut self, area: &mut A) -> Result<(), Error> {
        let address = self.receive_address(protocol::WRITE_TIMEOUT_MS)?;
        let offset = self.partition_offset(address)?;
        self.send_ack();

        let n = self.nak_on_err(|l| l.receive_byte(protocol::WRITE_TIMEOUT_MS))?;
        let len = n as usize + 1;

        // Data followed by the checksum byte.
        let mut buf = [0u8; MAX_CHUNK_SIZE + 1];
        self.nak_on_err(|l| l.receive_bytes(&mut buf[..=len], protocol::WRITE_TIMEOUT_MS))?;
        let (data, cs) = (&buf[..len], buf[len]);

        if n ^ protocol::checksum(data) != cs {
            warn!("Write checksum mismatch at {:#x}", address);
            self.send_nak();
            return IoSnafu.fail();
        }

        if let Err(e) = area.write(offset, data) {
            error!("Flash write failed at {:#x}: {}", offset, e);
            self.send_nak();
            return Err(e.into());
        }

        self.stats.bytes_written += len as u32;
        debug!("Wrote {} bytes at {:#x}", len, address);
        self.send_ack();
        Ok(())
    }

    /// Handle Read Memory: address frame, then `N ~N`, then `N+1` raw bytes.
    fn handle_read_memory<A: FlashArea>(&mut self, area: &mut A) -> Result<(), Error> {
        let address = self.receive_address(protocol::READ_TIMEOUT_MS)?;
        let offset = self.partition_offset(address)?;
        self.send_ack();

        let mut frame = [0u8; 2];
        self.nak_on_err(|l| l.receive_bytes(&mut frame, protocol::READ_TIMEOUT_MS))?;
        if !protocol::is_complement(frame[0], frame[1]) {
            warn!("Read length complement mismatch");
            self.send_nak();
            return IoSnafu.fail();
        }
        self.send_ack();

        let len = frame[0] as usize + 1;
        let mut buf = [0u8; MAX_CHUNK_SIZE];
        if let Err(e) = area.read(offset, &mut buf[..len]) {
            error!("Flash read failed at {:#x}: {}", offset, e);
            self.send_nak();
            return Err(e.into());
        }

        for &b in &buf[..len] {
            self.uart.poll_out(b);
        }
        self.stats.bytes_read += len as u32;
        debug!("Read {} bytes at {:#x}", len, address);
        Ok(())
    }

    /// Receive and validate an address frame. NAKs on timeout or bad checksum.
    fn receive_address(&mut self, timeout_ms: u32) -> Result<u32, Error> {
        let mut frame = [0u8; 5];
        self.nak_on_err(|l| l.receive_bytes(&mut frame, timeout_ms))?;

        match protocol::parse_address_frame(&frame) {
            Some(address) => Ok(address),
            None => {
                warn!("Address checksum mismatch");
                self.send_nak();
                IoSnafu.fail()
            }
        }
    }

    /// Map a bus address to a partition offset. NAKs below the flash window.
    fn partition_offset(&mut self, address: u32) -> Result<u32, Error> {
        let offset = protocol::to_partition_offset(address);
        if offset.is_none() {
            warn!("Address {:#x} below flash window", address);
            self.send_nak();
        }
        offset.context(OutOfRangeSnafu { address })
    }

    fn wait_for_sync(&mut self) -> Result<(), Error> {
        info!("Waiting for sync byte...");
        let byte = match self.receive_byte(protocol::SYNC_TIMEOUT_MS) {
            Ok(b) => b,
            Err(e) => {
                error!("Sync timeout");
                return Err(e);
            }
        };
        if byte != SYNC {
            error!("Invalid sync byte {:#x}", byte);
        }
        ensure!(byte == SYNC, IoSnafu);
        self.send_ack();
        info!("Sync received");
        Ok(())
    }

    /// Poll for one byte until `timeout_ms` elapses. Polls at least once.
    fn receive_byte(&mut self, timeout_ms: u32) -> Result<u8, Error> {
        let start = self.clock.uptime_ms();
        loop {
            if let Some(b) = self.uart.poll_in() {
                self.last_activity_time = self.clock.uptime_ms();
                return Ok(b);
            }
            if self.clock.uptime_ms() - start >= i64::from(timeout_ms) {
                return TimeoutSnafu.fail();
            }
            if self.config.poll_interval_us > 0 {
                self.clock.delay_us(self.config.poll_interval_us);
            }
        }
    }

    /// Fill `buf`, applying `timeout_ms` to each byte.
    fn receive_bytes(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<(), Error> {
        for slot in buf.iter_mut() {
            *slot = self.receive_byte(timeout_ms)?;
        }
        Ok(())
    }

    /// Run a receive step, replying NAK if it fails.
    fn nak_on_err<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        let result = f(self);
        if result.is_err() {
            self.send_nak();
        }
        result
    }

    fn send_ack(&mut self) {
        trace!("-> ACK");
        self.uart.poll_out(ACK);
    }

    fn send_nak(&mut self) {
        trace!("-> NAK");
        self.stats.naks += 1;
        self.uart.poll_out(NAK);
    }
}

/// Run a loader session with the default configuration.
///
/// Returns 0 on success or a negative errno (`-ETIMEDOUT` once the host goes
/// quiet, `-EIO` on a bad sync byte, driver codes unchanged).
pub fn ext_flash_loader_start<U, C, M>(uart: U, clock: C, flash_map: &mut M, timeout_sec: u32) -> i32
where
    U: Uart,
    C: Clock,
    M: FlashMap,
{
    let mut loader = ExtFlashLoader::new(uart, clock, LoaderConfig::default());
    to_errno(loader.start(flash_map, timeout_sec))
}
