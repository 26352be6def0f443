// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! AN2606 UART loader wire format (erase / write / read subset).
//!
//! The device side lives in [`crate::loader`]; the frame builders here are
//! used by host tools talking to it.

use heapless::Vec;

// --- Control bytes ---

pub const ACK: u8 = 0x79;
pub const NAK: u8 = 0x1F;
pub const SYNC: u8 = 0x7F;

// --- Timeouts (milliseconds) ---

pub const SYNC_TIMEOUT_MS: u32 = 5000;
pub const CMD_TIMEOUT_MS: u32 = 10_000;
pub const COMPLEMENT_TIMEOUT_MS: u32 = 1000;
pub const ERASE_TIMEOUT_MS: u32 = 30_000;
pub const WRITE_TIMEOUT_MS: u32 = 2000;
pub const READ_TIMEOUT_MS: u32 = 2000;

// --- Memory window ---

/// Bus address of the first byte of the NOR partition.
pub const FLASH_BASE: u32 = 0x9000_0000;

/// Largest payload of one Write or Read command.
pub const MAX_CHUNK_SIZE: usize = 256;

/// Extended-erase code selecting a full erase.
pub const ERASE_ALL: u16 = 0xFFFF;

/// Partition programmed by the loader.
pub const DEFAULT_PARTITION: &str = "nor_part";

/// Loader commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    ReadMemory = 0x11,
    WriteMemory = 0x31,
    ExtendedErase = 0x44,
}

impl Command {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Command byte followed by its complement.
    pub const fn header(self) -> [u8; 2] {
        [self as u8, !(self as u8)]
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x11 => Ok(Command::ReadMemory),
            0x31 => Ok(Command::WriteMemory),
            0x44 => Ok(Command::ExtendedErase),
            other => Err(other),
        }
    }
}

/// XOR of all bytes, starting from zero.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// True if `complement` is the bitwise inverse of `byte`.
pub const fn is_complement(byte: u8, complement: u8) -> bool {
    byte == !complement
}

/// Partition offset of a bus address, or `None` below [`FLASH_BASE`].
pub const fn to_partition_offset(address: u32) -> Option<u32> {
    address.checked_sub(FLASH_BASE)
}

// --- Frame parsing (device side) ---

/// Decode `A3 A2 A1 A0 xor`. Returns `None` on checksum mismatch.
pub fn parse_address_frame(frame: &[u8; 5]) -> Option<u32> {
    if checksum(&frame[..4]) != frame[4] {
        return None;
    }
    Some(u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]))
}

/// Decode `hi lo hi^lo`. Returns `None` on checksum mismatch.
pub fn parse_erase_frame(frame: &[u8; 3]) -> Option<u16> {
    if frame[0] ^ frame[1] != frame[2] {
        return None;
    }
    Some(u16::from_be_bytes([frame[0], frame[1]]))
}

// --- Frame building (host side) ---

pub fn address_frame(address: u32) -> [u8; 5] {
    let a = address.to_be_bytes();
    [a[0], a[1], a[2], a[3], checksum(&a)]
}

pub fn erase_frame(code: u16) -> [u8; 3] {
    let c = code.to_be_bytes();
    [c[0], c[1], c[0] ^ c[1]]
}

/// Build `N D0..DN xor(N, D0..DN)` for 1 to 256 data bytes.
pub fn write_frame(data: &[u8]) -> Option<Vec<u8, { MAX_CHUNK_SIZE + 2 }>> {
    if data.is_empty() || data.len() > MAX_CHUNK_SIZE {
        return None;
    }
    let n = (data.len() - 1) as u8;
    let mut frame = Vec::new();
    frame.push(n).ok()?;
    frame.extend_from_slice(data).ok()?;
    frame.push(n ^ checksum(data)).ok()?;
    Some(frame)
}

/// Build `N ~N` for reading 1 to 256 bytes.
pub fn read_length_frame(len: usize) -> Option<[u8; 2]> {
    if len == 0 || len > MAX_CHUNK_SIZE {
        return None;
    }
    let n = (len - 1) as u8;
    Some([n, !n])
}
