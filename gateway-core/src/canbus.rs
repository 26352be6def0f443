// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! ISO-TP data channel over CAN / CAN-FD.
//!
//! [`CanBus::init`] brings the controller up and spawns the RX task; received
//! messages go to the data handler fragment by fragment, in order. Sends are
//! blocking and go through [`CanBus::isotp_send`].

use embedded_can::StandardId;

use crate::config::CanConfig;
use crate::drivers::{
    CanBinder, CanController, CanMode, FcOpts, IsoTpLink, IsoTpStatus, MsgFlags, MsgId,
    SendCallback, TaskSpawner, TaskSpec, Timeout,
};
use crate::error::Error;

pub const RX_ID: u16 = 0x080;
pub const TX_ID: u16 = 0x180;

pub const BITRATE: u32 = 500_000;
/// Sample point in permille (87.5 %).
pub const SAMPLE_POINT: u16 = 875;

/// CAN-FD data length used for transmitted frames.
pub const FD_TX_DL: u8 = 64;

pub const FC_OPTS: FcOpts = FcOpts { bs: 8, stmin: 0 };

pub const RECV_TIMEOUT_MS: u32 = 2000;

pub const RX_TASK_NAME: &str = "rx_8_0";

const fn std_id(raw: u16) -> StandardId {
    match StandardId::new(raw) {
        Some(id) => id,
        None => panic!("not an 11-bit identifier"),
    }
}

const FD_FLAGS: MsgFlags = MsgFlags::FDF.union(MsgFlags::BRS);

/// Address the endpoint listens on.
pub const fn rx_addr(fd_mode: bool) -> MsgId {
    MsgId {
        std_id: std_id(RX_ID),
        dl: 0,
        flags: if fd_mode { FD_FLAGS } else { MsgFlags::NONE },
    }
}

/// Address the endpoint transmits on.
pub const fn tx_addr(fd_mode: bool) -> MsgId {
    MsgId {
        std_id: std_id(TX_ID),
        dl: if fd_mode { FD_TX_DL } else { 0 },
        flags: if fd_mode { FD_FLAGS } else { MsgFlags::NONE },
    }
}

/// Controller mode for a configuration.
pub fn can_mode(config: &CanConfig) -> CanMode {
    let mut mode = CanMode::NORMAL;
    if config.loopback {
        mode = mode | CanMode::LOOPBACK;
    }
    if config.fd_mode {
        mode = mode | CanMode::FD;
    }
    mode
}

fn send_complete(error_nr: i32) {
    if error_nr != 0 {
        error!("Error while sending data to {:#x}: {}", TX_ID, error_nr);
    }
}

/// Default data handler: logs the payload as text when it is valid UTF-8.
pub fn log_payload(data: &[u8]) {
    match core::str::from_utf8(data) {
        Ok(text) => info!("Received: {}", text),
        Err(_) => info!("Received {} raw bytes: {:?}", data.len(), data),
    }
}

/// Handle to an initialised CAN endpoint. Owns the send context.
pub struct CanBus<D: CanController> {
    dev: D,
    send_ctx: D::IsoTp,
    tx_addr: MsgId,
    rx_addr: MsgId,
}

impl<D: CanController> CanBus<D> {
    /// Bind the named device, apply timing and mode, start it and spawn the RX task.
    pub fn init<B, S, F>(
        binder: &mut B,
        dev_name: &str,
        config: &CanConfig,
        spawner: &mut S,
        handler: F,
    ) -> Result<Self, Error>
    where
        B: CanBinder<Device = D>,
        S: TaskSpawner,
        F: FnMut(&[u8]) + Send + 'static,
    {
        let Some(mut dev) = binder.get_binding(dev_name) else {
            error!("CAN device {} not found", dev_name);
            return Err(Error::NotReady);
        };
        if !dev.is_ready() {
            error!("CAN device {} not ready", dev_name);
            return Err(Error::NotReady);
        }

        let timing = dev.calc_timing(BITRATE, SAMPLE_POINT).map_err(|e| {
            error!("Failed to calculate bit timing: {}", e);
            Error::from(e)
        })?;
        dev.set_timing(&timing).map_err(|e| {
            error!("Failed to set bit timing: {}", e);
            Error::from(e)
        })?;

        let mode = can_mode(config);
        dev.set_mode(mode).map_err(|e| {
            error!("Failed to set CAN mode {:#x}: {}", mode.bits(), e);
            Error::from(e)
        })?;
        dev.start().map_err(|e| {
            error!("Failed to start CAN controller: {}", e);
            Error::from(e)
        })?;

        let rx_addr = rx_addr(config.fd_mode);
        let tx_addr = tx_addr(config.fd_mode);

        let task = RxTask::new(dev.isotp(), rx_addr, tx_addr, handler);
        let spec = TaskSpec {
            name: RX_TASK_NAME,
            priority: config.rx_thread_priority,
            stack_size: config.rx_thread_stack_size,
        };
        spawner.spawn(&spec, move || task.run()).map_err(|e| {
            error!("Failed to create RX thread: {}", e);
            Error::from(e)
        })?;

        info!("CAN endpoint up on {} (fd: {})", dev_name, config.fd_mode);
        let send_ctx = dev.isotp();
        Ok(Self {
            dev,
            send_ctx,
            tx_addr,
            rx_addr,
        })
    }

    /// Blocking ISO-TP send. The library status is returned unchanged.
    pub fn isotp_send(&mut self, data: &[u8]) -> Result<(), IsoTpStatus> {
        let result = self
            .send_ctx
            .send(data, &self.tx_addr, &self.rx_addr, Some(send_complete as SendCallback));
        if let Err(status) = result {
            warn!("Error while sending data to {:#x}: {}", TX_ID, status.code());
        }
        result
    }

    /// [`CanBus::isotp_send`] in the `0` / negative-code convention.
    pub fn canbus_isotp_send(&mut self, data: &[u8]) -> i32 {
        match self.isotp_send(data) {
            Ok(()) => IsoTpStatus::OK.code(),
            Err(status) => status.code(),
        }
    }

    pub fn device(&self) -> &D {
        &self.dev
    }
}

/// Receive side of the endpoint, run on its own thread.
pub struct RxTask<L, F> {
    ctx: L,
    rx_addr: MsgId,
    tx_addr: MsgId,
    handler: F,
}

impl<L, F> RxTask<L, F>
where
    L: IsoTpLink,
    F: FnMut(&[u8]),
{
    pub fn new(ctx: L, rx_addr: MsgId, tx_addr: MsgId, handler: F) -> Self {
        Self {
            ctx,
            rx_addr,
            tx_addr,
            handler,
        }
    }

    /// Bind the receive context, waiting as long as it takes.
    ///
    /// The context listens on the TX id and answers flow control on the RX
    /// id, so a controller in loopback mode hears the endpoint's own sends.
    pub fn bind(&mut self) -> Result<(), IsoTpStatus> {
        self.ctx
            .bind(&self.tx_addr, &self.rx_addr, &FC_OPTS, Timeout::Forever)
    }

    /// Receive one message, delivering each fragment as it arrives.
    ///
    /// Returns the number of bytes delivered. On error, fragments already
    /// delivered are not taken back.
    pub fn receive_message(&mut self) -> Result<usize, IsoTpStatus> {
        let mut delivered = 0;
        loop {
            let (chain, remaining) = self.ctx.recv_net(Timeout::Millis(RECV_TIMEOUT_MS))?;
            for fragment in chain {
                let bytes = fragment.as_ref();
                (self.handler)(bytes);
                delivered += bytes.len();
            }
            if remaining == 0 {
                return Ok(delivered);
            }
        }
    }

    /// Task body. Returns only if binding fails.
    pub fn run(mut self) {
        if let Err(status) = self.bind() {
            error!("Failed to bind to ID {:#x} [{}]", TX_ID, status.code());
            return;
        }

        loop {
            match self.receive_message() {
                Ok(len) => trace!("Received message of {} bytes", len),
                Err(IsoTpStatus::RECV_TIMEOUT) => {}
                Err(status) => debug!("Receive error {}", status.code()),
            }
        }
    }
}
