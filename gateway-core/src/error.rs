// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error type shared by all endpoints, plus POSIX-style error codes.

use core::fmt;

use snafu::Snafu;

/// POSIX error number as reported by the RTOS drivers.
///
/// Stored as the positive code; [`Errno::as_negative`] gives the return-value
/// form used by the C-shaped entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Errno(i32);

impl Errno {
    pub const EIO: Errno = Errno(5);
    pub const EAGAIN: Errno = Errno(11);
    pub const EBUSY: Errno = Errno(16);
    pub const ENODEV: Errno = Errno(19);
    pub const EINVAL: Errno = Errno(22);
    pub const ERANGE: Errno = Errno(34);
    pub const ETIMEDOUT: Errno = Errno(116);
    pub const EALREADY: Errno = Errno(120);
    pub const ENOTSUP: Errno = Errno(134);

    /// Build from either sign of the code (`-EIO` and `EIO` are the same).
    pub const fn new(code: i32) -> Self {
        Errno(code.wrapping_abs())
    }

    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn as_negative(self) -> i32 {
        -self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errno {}", self.as_negative())
    }
}

/// Gateway error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// Device missing or not ready.
    #[snafu(display("device not ready"))]
    NotReady,

    /// A deadline elapsed before the expected input arrived.
    #[snafu(display("timed out"))]
    Timeout,

    /// Framing or synchronisation error on the wire.
    #[snafu(display("framing error"))]
    Io,

    /// Request is valid but not served by this endpoint.
    #[snafu(display("operation not supported"))]
    NotSupported,

    /// Address outside the accepted window.
    #[snafu(display("address {:#x} out of range", address))]
    OutOfRange { address: u32 },

    /// Driver call failed; the code is passed through unchanged.
    #[snafu(display("driver error {}", errno.as_negative()))]
    Driver { errno: Errno },
}

impl Error {
    /// Negative POSIX code for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Error::NotReady => Errno::ENODEV.as_negative(),
            Error::Timeout => Errno::ETIMEDOUT.as_negative(),
            Error::Io => Errno::EIO.as_negative(),
            Error::NotSupported => Errno::ENOTSUP.as_negative(),
            Error::OutOfRange { .. } => Errno::ERANGE.as_negative(),
            Error::Driver { errno } => errno.as_negative(),
        }
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::Driver { errno }
    }
}

/// Collapse a result into the `0` / negative-code convention.
pub fn to_errno<T>(result: Result<T, Error>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.errno(),
    }
}
