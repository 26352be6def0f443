// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Test doubles for the driver traits.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use embedded_can::StandardId;
use embedded_hal::delay::DelayNs;

use gateway_core::drivers::{
    CanBinder, CanController, CanMode, CanTiming, Clock, FcOpts, FlashArea, FlashMap, IsoTpLink,
    IsoTpStatus, ModbusEngine, MsgId, SendCallback, ServerCallbacks, ServerParams, TaskSpawner,
    TaskSpec, Timeout, Uart, UartConfig,
};
use gateway_core::Errno;

// --- Clock ---

/// Simulated clock. Every uptime read advances time by one millisecond.
#[derive(Clone)]
pub struct FakeClock {
    now: Rc<Cell<i64>>,
    step: i64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            step: 1,
        }
    }

    /// Clock that only moves on delays, never on uptime reads.
    pub fn frozen() -> Self {
        Self {
            now: Rc::new(Cell::new(0)),
            step: 0,
        }
    }

    pub fn now(&self) -> i64 {
        self.now.get()
    }

    pub fn advance(&self, ms: i64) {
        self.now.set(self.now.get() + ms);
    }
}

impl DelayNs for FakeClock {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(i64::from(ns.div_ceil(1_000_000)));
    }
}

impl Clock for FakeClock {
    fn uptime_ms(&self) -> i64 {
        let t = self.now.get();
        self.now.set(t + self.step);
        t
    }
}

// --- UART ---

#[derive(Default)]
pub struct UartState {
    /// Bytes the host sends, each available from the given time on.
    pub rx: VecDeque<(i64, u8)>,
    pub tx: Vec<u8>,
    pub config: Option<UartConfig>,
    pub fail_configure: bool,
}

/// UART fed from a timed script, sharing time with a [`FakeClock`].
#[derive(Clone)]
pub struct ScriptedUart {
    state: Rc<RefCell<UartState>>,
    clock: FakeClock,
}

impl ScriptedUart {
    pub fn new(clock: &FakeClock) -> Self {
        Self {
            state: Rc::new(RefCell::new(UartState::default())),
            clock: clock.clone(),
        }
    }

    /// Queue bytes available immediately.
    pub fn feed(&self, bytes: &[u8]) {
        self.feed_at(0, bytes);
    }

    /// Queue bytes that become available at `at` ms.
    pub fn feed_at(&self, at: i64, bytes: &[u8]) {
        let mut s = self.state.borrow_mut();
        s.rx.extend(bytes.iter().map(|&b| (at, b)));
    }

    pub fn tx(&self) -> Vec<u8> {
        self.state.borrow().tx.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().rx.len()
    }

    pub fn configured(&self) -> Option<UartConfig> {
        self.state.borrow().config
    }

    pub fn fail_configure(&self) {
        self.state.borrow_mut().fail_configure = true;
    }
}

impl Uart for ScriptedUart {
    fn configure(&mut self, config: &UartConfig) -> Result<(), Errno> {
        let mut s = self.state.borrow_mut();
        if s.fail_configure {
            return Err(Errno::EINVAL);
        }
        s.config = Some(*config);
        Ok(())
    }

    fn poll_in(&mut self) -> Option<u8> {
        let now = self.clock.now();
        let mut s = self.state.borrow_mut();
        match s.rx.front() {
            Some(&(at, b)) if at <= now => {
                s.rx.pop_front();
                Some(b)
            }
            _ => None,
        }
    }

    fn poll_out(&mut self, byte: u8) {
        self.state.borrow_mut().tx.push(byte);
    }
}

// --- Flash ---

#[derive(Default)]
pub struct RamState {
    pub mem: Vec<u8>,
    pub erases: Vec<(u32, u32)>,
    pub writes: Vec<(u32, Vec<u8>)>,
    pub fail_writes: bool,
    pub fail_erase: bool,
}

/// NOR-like RAM partition: erase sets 0xFF, programming clears bits.
#[derive(Clone)]
pub struct RamPartition {
    state: Rc<RefCell<RamState>>,
    offset: u32,
}

impl RamPartition {
    pub fn new(size: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(RamState {
                mem: vec![0xFF; size],
                ..Default::default()
            })),
            offset: 0x0010_0000,
        }
    }

    pub fn filled(size: usize, value: u8) -> Self {
        let p = Self::new(size);
        p.state.borrow_mut().mem.fill(value);
        p
    }

    pub fn contents(&self, offset: usize, len: usize) -> Vec<u8> {
        self.state.borrow().mem[offset..offset + len].to_vec()
    }

    pub fn state(&self) -> std::cell::Ref<'_, RamState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, RamState> {
        self.state.borrow_mut()
    }

    fn check(&self, offset: u32, len: usize) -> Result<usize, Errno> {
        let start = offset as usize;
        if start + len > self.state.borrow().mem.len() {
            return Err(Errno::EINVAL);
        }
        Ok(start)
    }
}

impl FlashArea for RamPartition {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn size(&self) -> u32 {
        self.state.borrow().mem.len() as u32
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Errno> {
        let start = self.check(offset, buf.len())?;
        buf.copy_from_slice(&self.state.borrow().mem[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Errno> {
        let start = self.check(offset, data.len())?;
        let mut s = self.state.borrow_mut();
        if s.fail_writes {
            return Err(Errno::EIO);
        }
        for (dst, src) in s.mem[start..start + data.len()].iter_mut().zip(data) {
            *dst &= *src;
        }
        s.writes.push((offset, data.to_vec()));
        Ok(())
    }

    fn erase(&mut self, offset: u32, len: u32) -> Result<(), Errno> {
        let start = self.check(offset, len as usize)?;
        let mut s = self.state.borrow_mut();
        if s.fail_erase {
            return Err(Errno::EIO);
        }
        s.mem[start..start + len as usize].fill(0xFF);
        s.erases.push((offset, len));
        Ok(())
    }
}

/// Partition table with a single labelled partition.
pub struct RamFlashMap {
    pub label: &'static str,
    pub partition: RamPartition,
    pub opened: usize,
    pub closed: usize,
}

impl RamFlashMap {
    pub fn new(label: &'static str, partition: RamPartition) -> Self {
        Self {
            label,
            partition,
            opened: 0,
            closed: 0,
        }
    }
}

impl FlashMap for RamFlashMap {
    type Area = RamPartition;

    fn open(&mut self, label: &str) -> Result<RamPartition, Errno> {
        if label != self.label {
            return Err(Errno::ENODEV);
        }
        self.opened += 1;
        Ok(self.partition.clone())
    }

    fn close(&mut self, _area: RamPartition) {
        self.closed += 1;
    }
}

/// Partition table with several labelled partitions.
#[derive(Default)]
pub struct PartitionTable {
    pub partitions: Vec<(&'static str, RamPartition)>,
    pub opened: Vec<String>,
}

impl PartitionTable {
    pub fn with(mut self, label: &'static str, partition: RamPartition) -> Self {
        self.partitions.push((label, partition));
        self
    }
}

impl FlashMap for PartitionTable {
    type Area = RamPartition;

    fn open(&mut self, label: &str) -> Result<RamPartition, Errno> {
        let (_, partition) = self
            .partitions
            .iter()
            .find(|(l, _)| *l == label)
            .ok_or(Errno::ENODEV)?;
        self.opened.push(label.to_string());
        Ok(partition.clone())
    }
}

// --- CAN / ISO-TP ---

#[derive(Debug, Clone, PartialEq)]
pub enum CanCall {
    CalcTiming(u32, u16),
    SetTiming(CanTiming),
    SetMode(CanMode),
    Start,
    Bind(MsgId, MsgId, FcOpts, Timeout),
    Send(Vec<u8>, MsgId, MsgId),
}

pub type RecvResult = Result<(Vec<Vec<u8>>, usize), IsoTpStatus>;

#[derive(Default)]
pub struct CanState {
    pub calls: Vec<CanCall>,
    pub ready: bool,
    pub fail_timing: Option<Errno>,
    pub fail_start: Option<Errno>,
    pub bind_status: Option<IsoTpStatus>,
    pub send_status: Option<IsoTpStatus>,
    pub recv: VecDeque<RecvResult>,
    pub recv_timeouts: Vec<Timeout>,
    /// Mode last applied with `set_mode`.
    pub mode: Option<CanMode>,
    /// Identifier the receive context is bound to.
    pub listen_id: Option<StandardId>,
}

/// CAN controller recording every call.
#[derive(Clone)]
pub struct MockCan {
    pub state: Arc<Mutex<CanState>>,
}

impl MockCan {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CanState {
                ready: true,
                ..Default::default()
            })),
        }
    }

    pub fn calls(&self) -> Vec<CanCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn queue_recv(&self, result: RecvResult) {
        self.state.lock().unwrap().recv.push_back(result);
    }
}

pub const TEST_TIMING: CanTiming = CanTiming {
    sjw: 1,
    prop_seg: 0,
    phase_seg1: 13,
    phase_seg2: 2,
    prescaler: 5,
};

impl CanController for MockCan {
    type IsoTp = MockIsoTp;

    fn is_ready(&self) -> bool {
        self.state.lock().unwrap().ready
    }

    fn calc_timing(&self, bitrate: u32, sample_point: u16) -> Result<CanTiming, Errno> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(CanCall::CalcTiming(bitrate, sample_point));
        match s.fail_timing {
            Some(e) => Err(e),
            None => Ok(TEST_TIMING),
        }
    }

    fn set_timing(&mut self, timing: &CanTiming) -> Result<(), Errno> {
        self.state.lock().unwrap().calls.push(CanCall::SetTiming(*timing));
        Ok(())
    }

    fn set_mode(&mut self, mode: CanMode) -> Result<(), Errno> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(CanCall::SetMode(mode));
        s.mode = Some(mode);
        Ok(())
    }

    fn start(&mut self) -> Result<(), Errno> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(CanCall::Start);
        match s.fail_start {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn isotp(&self) -> MockIsoTp {
        MockIsoTp {
            state: self.state.clone(),
        }
    }
}

/// ISO-TP context backed by the controller's script.
pub struct MockIsoTp {
    state: Arc<Mutex<CanState>>,
}

impl IsoTpLink for MockIsoTp {
    type Fragment = Vec<u8>;
    type Chain = Vec<Vec<u8>>;

    fn bind(
        &mut self,
        rx_addr: &MsgId,
        tx_addr: &MsgId,
        opts: &FcOpts,
        timeout: Timeout,
    ) -> Result<(), IsoTpStatus> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(CanCall::Bind(*rx_addr, *tx_addr, *opts, timeout));
        match s.bind_status {
            Some(status) => Err(status),
            None => {
                s.listen_id = Some(rx_addr.std_id);
                Ok(())
            }
        }
    }

    fn recv_net(&mut self, timeout: Timeout) -> RecvResult {
        let mut s = self.state.lock().unwrap();
        s.recv_timeouts.push(timeout);
        s.recv
            .pop_front()
            .unwrap_or(Err(IsoTpStatus::RECV_TIMEOUT))
    }

    fn send(
        &mut self,
        data: &[u8],
        tx_addr: &MsgId,
        rx_addr: &MsgId,
        complete: Option<SendCallback>,
    ) -> Result<(), IsoTpStatus> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(CanCall::Send(data.to_vec(), *tx_addr, *rx_addr));
        let status = s.send_status.unwrap_or(IsoTpStatus::OK);
        // A loopback controller hands its own frames to a matching receiver.
        let looped = s.mode.is_some_and(|m| m.contains(CanMode::LOOPBACK));
        if status.is_ok() && looped && s.listen_id == Some(tx_addr.std_id) {
            s.recv.push_back(Ok((vec![data.to_vec()], 0)));
        }
        if let Some(cb) = complete {
            cb(status.code());
        }
        if status.is_ok() {
            Ok(())
        } else {
            Err(status)
        }
    }
}

pub struct MockBinder {
    pub name: &'static str,
    pub device: MockCan,
}

impl CanBinder for MockBinder {
    type Device = MockCan;

    fn get_binding(&mut self, name: &str) -> Option<MockCan> {
        (name == self.name).then(|| self.device.clone())
    }
}

// --- Tasks ---

/// Records spawn requests and keeps the task bodies for the test to run.
#[derive(Default)]
pub struct RecordingSpawner {
    pub specs: Vec<TaskSpec>,
    pub tasks: Vec<Box<dyn FnOnce() + Send>>,
    pub fail: Option<Errno>,
}

impl TaskSpawner for RecordingSpawner {
    fn spawn<F>(&mut self, spec: &TaskSpec, task: F) -> Result<(), Errno>
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(e) = self.fail {
            return Err(e);
        }
        self.specs.push(*spec);
        self.tasks.push(Box::new(task));
        Ok(())
    }
}

// --- Modbus ---

/// Modbus engine with named interfaces that keeps the registered callbacks.
pub struct MockEngine<'a> {
    pub ifaces: Vec<&'static str>,
    pub servers: Vec<(usize, ServerParams, &'a dyn ServerCallbacks)>,
    pub fail_init: Option<Errno>,
}

impl<'a> MockEngine<'a> {
    pub fn new(ifaces: &[&'static str]) -> Self {
        Self {
            ifaces: ifaces.to_vec(),
            servers: Vec::new(),
            fail_init: None,
        }
    }
}

impl<'a> ModbusEngine<'a> for MockEngine<'a> {
    fn iface_get_by_name(&self, name: &str) -> Option<usize> {
        self.ifaces.iter().position(|&n| n == name)
    }

    fn init_server(
        &mut self,
        iface: usize,
        params: &ServerParams,
        callbacks: &'a dyn ServerCallbacks,
    ) -> Result<(), Errno> {
        if let Some(e) = self.fail_init {
            return Err(e);
        }
        self.servers.push((iface, *params, callbacks));
        Ok(())
    }
}
