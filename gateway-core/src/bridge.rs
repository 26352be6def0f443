// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Transparent pass-through between two UARTs.
//!
//! Each side is drained in bursts: once a byte arrives, reading continues
//! until the line has been empty for a number of consecutive polls. The
//! buffered burst is then forwarded to the other side.

use heapless::Deque;

use crate::drivers::{Clock, Uart};

pub const BRIDGE_BUF_SIZE: usize = 8192;

/// Empty polls that end a burst on side A.
pub const SILENCE_POLLS_A: usize = 5000;
/// Empty polls that end a burst on side B.
pub const SILENCE_POLLS_B: usize = 20_000;

/// Delay between idle passes of [`UartBridge::run`].
pub const IDLE_YIELD_US: u32 = 100;

type Buffer = Deque<u8, BRIDGE_BUF_SIZE>;

pub struct UartBridge<A, B> {
    uart_a: A,
    uart_b: B,
    a_to_b: Buffer,
    b_to_a: Buffer,
    silence_a: usize,
    silence_b: usize,
    dropped: usize,
}

impl<A: Uart, B: Uart> UartBridge<A, B> {
    pub fn new(uart_a: A, uart_b: B) -> Self {
        Self::with_silence(uart_a, uart_b, SILENCE_POLLS_A, SILENCE_POLLS_B)
    }

    pub fn with_silence(uart_a: A, uart_b: B, silence_a: usize, silence_b: usize) -> Self {
        Self {
            uart_a,
            uart_b,
            a_to_b: Deque::new(),
            b_to_a: Deque::new(),
            silence_a,
            silence_b,
            dropped: 0,
        }
    }

    /// Bytes lost because a buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// One bridge pass. Returns true if either side had input.
    pub fn poll(&mut self) -> bool {
        let mut activity = false;

        if read_until_silence(&mut self.uart_a, &mut self.a_to_b, self.silence_a, &mut self.dropped) {
            activity = true;
        }
        if read_until_silence(&mut self.uart_b, &mut self.b_to_a, self.silence_b, &mut self.dropped) {
            activity = true;
        }

        while let Some(b) = self.a_to_b.pop_front() {
            self.uart_b.poll_out(b);
        }
        while let Some(b) = self.b_to_a.pop_front() {
            self.uart_a.poll_out(b);
        }

        activity
    }

    /// Bridge forever, yielding between idle passes.
    pub fn run<C: Clock>(&mut self, clock: &mut C) -> ! {
        info!("UART bridge running");
        loop {
            if !self.poll() {
                clock.delay_us(IDLE_YIELD_US);
            }
        }
    }

    pub fn into_inner(self) -> (A, B) {
        (self.uart_a, self.uart_b)
    }
}

fn push(buf: &mut Buffer, byte: u8, dropped: &mut usize) {
    if buf.push_back(byte).is_err() {
        *dropped += 1;
    }
}

/// Drain `uart` into `buf` until `threshold` consecutive empty polls.
///
/// Returns false without waiting if no byte is pending.
fn read_until_silence<U: Uart>(
    uart: &mut U,
    buf: &mut Buffer,
    threshold: usize,
    dropped: &mut usize,
) -> bool {
    let Some(first) = uart.poll_in() else {
        return false;
    };
    push(buf, first, dropped);

    let mut silence = 0;
    while silence <= threshold {
        match uart.poll_in() {
            Some(b) => {
                push(buf, b, dropped);
                silence = 0;
            }
            None => {
                if let Err(e) = uart.err_check() {
                    debug!("UART line error: {}", e);
                }
                silence += 1;
                core::hint::spin_loop();
            }
        }
    }
    true
}
