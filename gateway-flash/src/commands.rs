// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for loader operations.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};

use gateway_core::protocol::{FLASH_BASE, MAX_CHUNK_SIZE};

use crate::transport::Transport;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
const CHUNK_SIZE: usize = MAX_CHUNK_SIZE;

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Drop `skip` leading bytes (an image header) from `image`.
fn strip_header(image: &[u8], skip: usize) -> Result<&[u8]> {
    if skip >= image.len() {
        bail!(
            "Image is {} bytes, nothing left after skipping {} header bytes",
            image.len(),
            skip
        );
    }
    Ok(&image[skip..])
}

/// Reject ranges starting below the flash window or wrapping the address space.
fn check_range(address: u32, len: usize) -> Result<()> {
    if address < FLASH_BASE {
        bail!(
            "Address 0x{:08x} is below the flash window at 0x{:08x}",
            address,
            FLASH_BASE
        );
    }
    if u64::from(address) + len as u64 > u64::from(u32::MAX) + 1 {
        bail!("Range 0x{:08x}+{} exceeds the address space", address, len);
    }
    Ok(())
}

/// Check that the loader is listening.
pub fn sync(transport: &mut Transport) -> Result<()> {
    print!("Syncing with loader on {}... ", transport.port_name());
    std::io::stdout().flush()?;
    transport.sync()?;
    println!("OK");
    Ok(())
}

/// Erase the whole partition.
pub fn erase(transport: &mut Transport) -> Result<()> {
    print!("Erasing external flash (can take 30 s)... ");
    std::io::stdout().flush()?;
    transport.erase_all()?;
    println!("OK");
    Ok(())
}

/// Program `file` at `address`.
pub fn write(
    transport: &mut Transport,
    file: &Path,
    address: u32,
    skip_header: usize,
    erase_first: bool,
    verify: bool,
) -> Result<()> {
    let image = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let payload = strip_header(&image, skip_header)?;
    check_range(address, payload.len())?;
    let crc32 = CRC32.checksum(payload);

    println!(
        "Image:   {} ({} bytes, {} header bytes skipped, CRC32: 0x{:08x})",
        file.display(),
        payload.len(),
        skip_header,
        crc32
    );
    println!("Target:  0x{:08x}", address);
    println!();

    if erase_first {
        erase(transport)?;
    }

    let pb = progress_bar(payload.len() as u64)?;
    let mut offset = 0usize;
    for chunk in payload.chunks(CHUNK_SIZE) {
        let chunk_addr = address + offset as u32;
        if let Err(e) = transport.write_memory(chunk_addr, chunk) {
            pb.abandon();
            return Err(e.context(format!("Write failed at 0x{:08x}", chunk_addr)));
        }
        offset += chunk.len();
        pb.set_position(offset as u64);
    }
    pb.finish_with_message("Write complete");
    println!();

    if verify {
        print!("Verifying... ");
        std::io::stdout().flush()?;
        let readback = read_range(transport, address, payload.len(), None)?;
        let readback_crc = CRC32.checksum(&readback);
        if readback_crc != crc32 {
            bail!(
                "Verify failed: CRC32 0x{:08x}, expected 0x{:08x}",
                readback_crc,
                crc32
            );
        }
        println!("OK");
    }

    println!();
    println!("Image written successfully!");
    Ok(())
}

/// Dump `length` bytes from `address` to `output`.
pub fn read(transport: &mut Transport, address: u32, length: usize, output: &Path) -> Result<()> {
    if length == 0 {
        bail!("Length must be at least 1 byte");
    }
    check_range(address, length)?;

    let pb = progress_bar(length as u64)?;
    let data = read_range(transport, address, length, Some(&pb))?;
    pb.finish_with_message("Read complete");

    fs::write(output, &data).with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Read {} bytes from 0x{:08x} into {} (CRC32: 0x{:08x})",
        data.len(),
        address,
        output.display(),
        CRC32.checksum(&data)
    );
    Ok(())
}

fn read_range(
    transport: &mut Transport,
    address: u32,
    length: usize,
    pb: Option<&ProgressBar>,
) -> Result<Vec<u8>> {
    let mut data = vec![0u8; length];
    let mut offset = 0usize;
    for chunk in data.chunks_mut(CHUNK_SIZE) {
        let chunk_addr = address + offset as u32;
        if let Err(e) = transport.read_memory(chunk_addr, chunk) {
            if let Some(pb) = pb {
                pb.abandon();
            }
            return Err(e.context(format!("Read failed at 0x{:08x}", chunk_addr)));
        }
        offset += chunk.len();
        if let Some(pb) = pb {
            pb.set_position(offset as u64);
        }
    }
    Ok(data)
}
