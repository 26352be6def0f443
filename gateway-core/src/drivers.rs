// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Driver and RTOS interfaces consumed by the protocol endpoints.
//!
//! The endpoints never touch hardware directly. A board support crate (or a
//! test) implements these traits on top of the real drivers.

use bitflags::bitflags;
use embedded_can::StandardId;
use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

use crate::error::Errno;

// --- Time ---

/// Monotonic clock with blocking delays.
pub trait Clock: DelayNs {
    /// Milliseconds since boot.
    fn uptime_ms(&self) -> i64;
}

// --- UART ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    None,
    RtsCts,
}

/// Serial line settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UartConfig {
    pub baudrate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl UartConfig {
    /// 115200 8E1, the line format required by the AN2606 loader.
    pub const AN2606: UartConfig = UartConfig {
        baudrate: 115_200,
        data_bits: 8,
        parity: Parity::Even,
        stop_bits: StopBits::One,
        flow_control: FlowControl::None,
    };

    /// 115200 8N1, the Modbus-RTU server line.
    pub const MODBUS_RTU: UartConfig = UartConfig {
        baudrate: 115_200,
        data_bits: 8,
        parity: Parity::None,
        stop_bits: StopBits::One,
        flow_control: FlowControl::None,
    };
}

/// Polled UART.
pub trait Uart {
    fn configure(&mut self, config: &UartConfig) -> Result<(), Errno>;

    /// Non-blocking read of one byte.
    fn poll_in(&mut self) -> Option<u8>;

    /// Blocking write of one byte.
    fn poll_out(&mut self, byte: u8);

    /// Check and clear pending line errors (overrun, framing, parity).
    fn err_check(&mut self) -> Result<(), Errno> {
        Ok(())
    }
}

// --- Flash ---

/// One opened flash partition. Offsets are relative to the partition start.
pub trait FlashArea {
    /// Absolute offset of the partition inside its flash device.
    fn offset(&self) -> u32;

    fn size(&self) -> u32;

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Errno>;

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Errno>;

    fn erase(&mut self, offset: u32, len: u32) -> Result<(), Errno>;
}

/// Fixed partition table.
pub trait FlashMap {
    type Area: FlashArea;

    fn open(&mut self, label: &str) -> Result<Self::Area, Errno>;

    /// Release a handle obtained from [`FlashMap::open`].
    fn close(&mut self, area: Self::Area) {
        drop(area);
    }
}

// --- CAN ---

/// Bit timing segments as computed by the controller driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CanTiming {
    pub sjw: u16,
    pub prop_seg: u16,
    pub phase_seg1: u16,
    pub phase_seg2: u16,
    pub prescaler: u16,
}

bitflags! {
    /// Controller operating mode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CanMode: u32 {
        const LOOPBACK = 1 << 0;
        const LISTENONLY = 1 << 1;
        const FD = 1 << 2;
    }
}

impl CanMode {
    pub const NORMAL: CanMode = CanMode::empty();
}

/// CAN controller.
pub trait CanController {
    type IsoTp: IsoTpLink;

    fn is_ready(&self) -> bool;

    /// Compute timing for `bitrate` with the sample point in permille.
    fn calc_timing(&self, bitrate: u32, sample_point: u16) -> Result<CanTiming, Errno>;

    fn set_timing(&mut self, timing: &CanTiming) -> Result<(), Errno>;

    fn set_mode(&mut self, mode: CanMode) -> Result<(), Errno>;

    fn start(&mut self) -> Result<(), Errno>;

    /// New ISO-TP context on this controller.
    fn isotp(&self) -> Self::IsoTp;
}

/// Device lookup by name.
pub trait CanBinder {
    type Device: CanController;

    fn get_binding(&mut self, name: &str) -> Option<Self::Device>;
}

// --- ISO-TP ---

bitflags! {
    /// ISO-TP addressing flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MsgFlags: u8 {
        const EXT_ADDR = 1 << 0;
        const FIXED_ADDR = 1 << 1;
        const IDE = 1 << 2;
        /// CAN-FD frame format.
        const FDF = 1 << 3;
        /// CAN-FD bit rate switch.
        const BRS = 1 << 4;
    }
}

impl MsgFlags {
    pub const NONE: MsgFlags = MsgFlags::empty();
}

/// One side of an ISO-TP address pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgId {
    pub std_id: StandardId,
    /// CAN data length used when transmitting; 0 lets the library pick 8.
    pub dl: u8,
    pub flags: MsgFlags,
}

/// Flow-control options advertised to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FcOpts {
    /// Block size.
    pub bs: u8,
    /// Minimum separation time.
    pub stmin: u8,
}

/// Blocking wait bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    NoWait,
    Millis(u32),
    Forever,
}

/// Status code of the ISO-TP library (0 is OK, errors are negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoTpStatus(i32);

impl IsoTpStatus {
    pub const OK: IsoTpStatus = IsoTpStatus(0);
    pub const TIMEOUT_A: IsoTpStatus = IsoTpStatus(-1);
    pub const TIMEOUT_BS: IsoTpStatus = IsoTpStatus(-2);
    pub const TIMEOUT_CR: IsoTpStatus = IsoTpStatus(-3);
    pub const WRONG_SN: IsoTpStatus = IsoTpStatus(-4);
    pub const INVALID_FS: IsoTpStatus = IsoTpStatus(-5);
    pub const UNEXP_PDU: IsoTpStatus = IsoTpStatus(-6);
    pub const WFT_OVRN: IsoTpStatus = IsoTpStatus(-7);
    pub const BUFFER_OVERFLOW: IsoTpStatus = IsoTpStatus(-8);
    pub const ERROR: IsoTpStatus = IsoTpStatus(-9);
    pub const NO_FREE_FILTER: IsoTpStatus = IsoTpStatus(-10);
    pub const NO_NET_BUF_LEFT: IsoTpStatus = IsoTpStatus(-11);
    pub const NO_BUF_DATA_LEFT: IsoTpStatus = IsoTpStatus(-12);
    pub const NO_CTX_LEFT: IsoTpStatus = IsoTpStatus(-13);
    pub const RECV_TIMEOUT: IsoTpStatus = IsoTpStatus(-14);

    pub const fn new(code: i32) -> Self {
        IsoTpStatus(code)
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }
}

/// Completion callback for [`IsoTpLink::send`], called with the final status code.
pub type SendCallback = fn(i32);

/// ISO-TP context.
///
/// A receive context is bound once and then polled; a send context is used
/// for blocking sends. The library serialises access to the controller.
pub trait IsoTpLink: Send + 'static {
    /// One received buffer fragment. Dropping it frees the buffer.
    type Fragment: AsRef<[u8]>;
    /// Ordered chain of fragments returned by one `recv_net` call.
    type Chain: IntoIterator<Item = Self::Fragment>;

    /// Receive on `rx_addr`; flow-control frames go out on `tx_addr`.
    fn bind(
        &mut self,
        rx_addr: &MsgId,
        tx_addr: &MsgId,
        opts: &FcOpts,
        timeout: Timeout,
    ) -> Result<(), IsoTpStatus>;

    /// Next fragment chain and the number of bytes of the message still to come.
    fn recv_net(&mut self, timeout: Timeout) -> Result<(Self::Chain, usize), IsoTpStatus>;

    fn send(
        &mut self,
        data: &[u8],
        tx_addr: &MsgId,
        rx_addr: &MsgId,
        complete: Option<SendCallback>,
    ) -> Result<(), IsoTpStatus>;
}

// --- Tasks ---

/// Thread creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: &'static str,
    pub priority: i32,
    pub stack_size: usize,
}

/// Creates kernel threads.
pub trait TaskSpawner {
    fn spawn<F>(&mut self, spec: &TaskSpec, task: F) -> Result<(), Errno>
    where
        F: FnOnce() + Send + 'static;
}

// --- Modbus ---

/// User callbacks of a Modbus server.
///
/// Only holding registers are mandatory; the other tables answer
/// `ENOTSUP`, which the engine turns into an exception response.
pub trait ServerCallbacks: Sync {
    fn coil_rd(&self, _addr: u16) -> Result<bool, Errno> {
        Err(Errno::ENOTSUP)
    }

    fn coil_wr(&self, _addr: u16, _state: bool) -> Result<(), Errno> {
        Err(Errno::ENOTSUP)
    }

    fn discrete_input_rd(&self, _addr: u16) -> Result<bool, Errno> {
        Err(Errno::ENOTSUP)
    }

    fn input_reg_rd(&self, _addr: u16) -> Result<u16, Errno> {
        Err(Errno::ENOTSUP)
    }

    /// Store the register value in `reg`. Implementations write `reg` even on failure.
    fn holding_reg_rd(&self, addr: u16, reg: &mut u16) -> Result<(), Errno>;

    fn holding_reg_wr(&self, addr: u16, reg: u16) -> Result<(), Errno>;
}

/// Server-mode parameters handed to the Modbus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerParams {
    pub unit_id: u8,
    pub serial: UartConfig,
}

/// External Modbus engine owning the RTU framing and server tasks.
pub trait ModbusEngine<'a> {
    fn iface_get_by_name(&self, name: &str) -> Option<usize>;

    fn init_server(
        &mut self,
        iface: usize,
        params: &ServerParams,
        callbacks: &'a dyn ServerCallbacks,
    ) -> Result<(), Errno>;
}
