// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Modbus-RTU slave serving holding registers from externally owned cells.
//!
//! Other subsystems own the 16-bit cells and keep updating them; the table
//! only borrows them. Coils and input registers are not served.

use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU16, Ordering};

use crate::config::ModbusConfig;
use crate::drivers::{ModbusEngine, ServerCallbacks, ServerParams};
use crate::error::{Errno, Error};

/// Number of holding register slots.
pub const HOLDING_REG_COUNT: usize = 64;

/// Sparse map from register address to a borrowed cell.
///
/// Slots can be filled while the server is already running; reads and writes
/// of an empty slot answer `ENOTSUP`.
pub struct HoldingRegisters<'a> {
    slots: [AtomicPtr<AtomicU16>; HOLDING_REG_COUNT],
    // Invariant in 'a: a shorter-lived cell must not be installed through a
    // reborrowed table.
    _cells: PhantomData<fn(&'a AtomicU16) -> &'a AtomicU16>,
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicPtr<AtomicU16> = AtomicPtr::new(ptr::null_mut());

impl<'a> HoldingRegisters<'a> {
    pub const fn new() -> Self {
        Self {
            slots: [EMPTY_SLOT; HOLDING_REG_COUNT],
            _cells: PhantomData,
        }
    }

    /// Install `cell` at `addr`, replacing any previous entry.
    pub fn add(&self, cell: &'a AtomicU16, addr: u16) -> Result<(), Error> {
        let Some(slot) = self.slots.get(addr as usize) else {
            return Err(Error::OutOfRange {
                address: u32::from(addr),
            });
        };
        slot.store(cell as *const AtomicU16 as *mut AtomicU16, Ordering::Release);
        Ok(())
    }

    fn cell(&self, addr: u16) -> Option<&'a AtomicU16> {
        let p = self.slots.get(addr as usize)?.load(Ordering::Acquire);
        // SAFETY: non-null slots only ever hold pointers taken from a
        // `&'a AtomicU16` in `add`, and the table cannot outlive `'a`.
        unsafe { p.as_ref() }
    }

    pub fn is_installed(&self, addr: u16) -> bool {
        self.cell(addr).is_some()
    }
}

impl Default for HoldingRegisters<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCallbacks for HoldingRegisters<'_> {
    fn holding_reg_rd(&self, addr: u16, reg: &mut u16) -> Result<(), Errno> {
        if addr as usize >= HOLDING_REG_COUNT {
            return Err(Errno::ENOTSUP);
        }
        match self.cell(addr) {
            Some(cell) => {
                *reg = cell.load(Ordering::Relaxed);
                Ok(())
            }
            None => {
                *reg = 0;
                Err(Errno::ENOTSUP)
            }
        }
    }

    fn holding_reg_wr(&self, addr: u16, reg: u16) -> Result<(), Errno> {
        match self.cell(addr) {
            Some(cell) => {
                cell.store(reg, Ordering::Relaxed);
                Ok(())
            }
            None => Err(Errno::ENOTSUP),
        }
    }
}

/// A Modbus server registered with the engine.
pub struct ModbusSlave<'a> {
    iface: usize,
    regs: &'a HoldingRegisters<'a>,
}

impl<'a> ModbusSlave<'a> {
    /// Register a server on `iface_name` answering from `regs`.
    pub fn init<E>(
        engine: &mut E,
        iface_name: &str,
        config: &ModbusConfig,
        regs: &'a HoldingRegisters<'a>,
    ) -> Result<Self, Error>
    where
        E: ModbusEngine<'a>,
    {
        let Some(iface) = engine.iface_get_by_name(iface_name) else {
            error!("Failed to get iface index for {}", iface_name);
            return Err(Error::NotReady);
        };

        let params = ServerParams {
            unit_id: config.unit_id,
            serial: config.serial,
        };
        if let Err(e) = engine.init_server(iface, &params, regs) {
            error!("Modbus RTU server initialization failed: {}", e);
            return Err(e.into());
        }

        info!(
            "Modbus server on {} (unit {}, {} baud)",
            iface_name, params.unit_id, params.serial.baudrate
        );
        Ok(Self { iface, regs })
    }

    /// Install a cell at `addr` (0 to 63).
    pub fn add_holding_reg(&self, cell: &'a AtomicU16, addr: u16) -> Result<(), Error> {
        self.regs.add(cell, addr)
    }

    pub fn iface(&self) -> usize {
        self.iface
    }
}

/// Register a server with the default parameters (unit 1, 115200 8N1).
pub fn mb_slave_init<'a, E>(
    engine: &mut E,
    iface_name: &str,
    regs: &'a HoldingRegisters<'a>,
) -> Result<ModbusSlave<'a>, Error>
where
    E: ModbusEngine<'a>,
{
    ModbusSlave::init(engine, iface_name, &ModbusConfig::default(), regs)
}

/// Install `cell` at `addr` in `regs`.
pub fn mb_add_holding_reg<'a>(
    regs: &HoldingRegisters<'a>,
    cell: &'a AtomicU16,
    addr: u16,
) -> Result<(), Error> {
    regs.add(cell, addr)
}
