//! Error taxonomy shared by the pipeline and its backends.
//!
//! Numeric codes follow the `esp_err_t` values the buses report on target so
//! that an error can cross the scripting/FFI boundary as a plain integer.

use core::fmt;

/// Generic failure
pub const ESP_FAIL: i32 = -1;
/// Out of memory
pub const ESP_ERR_NO_MEM: i32 = 0x101;
/// Invalid argument
pub const ESP_ERR_INVALID_ARG: i32 = 0x102;
/// Invalid state
pub const ESP_ERR_INVALID_STATE: i32 = 0x103;
/// Operation or feature not supported
pub const ESP_ERR_NOT_SUPPORTED: i32 = 0x106;
/// Operation timed out
pub const ESP_ERR_TIMEOUT: i32 = 0x107;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Backend or pipeline initialisation failed; the bus instance is unusable.
    InitFailed { code: i32, message: String },
    /// A single flush could not be transmitted. The bus stays usable.
    TransmitFailed(i32),
    /// A frame buffer could not be allocated.
    OutOfMemory,
    /// Invalid argument
    InvalidArg,
    /// The call is not valid in the current bus or buffer state.
    InvalidState,
    /// Operation or feature not supported by the backend.
    NotSupported,
    /// The bus has been deinitialised.
    Closed,
    /// A write or read on the underlying bus failed.
    Bus(&'static str),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    /// The `esp_err_t` equivalent of this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::InitFailed { code, .. } => *code,
            Error::TransmitFailed(code) => *code,
            Error::OutOfMemory => ESP_ERR_NO_MEM,
            Error::InvalidArg => ESP_ERR_INVALID_ARG,
            Error::InvalidState | Error::Closed => ESP_ERR_INVALID_STATE,
            Error::NotSupported => ESP_ERR_NOT_SUPPORTED,
            Error::Bus(_) => ESP_FAIL,
        }
    }

    /// Wraps a backend `init` failure so it can be stored for the init rendezvous.
    ///
    /// Allocation failures keep their own variant since they are raised the same
    /// way from `allocate_framebuffer`.
    pub(crate) fn into_init_failure(self) -> Self {
        match self {
            Error::InitFailed { .. } | Error::OutOfMemory => self,
            other => Error::InitFailed {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }

    /// Maps any error raised while a flush was being sent onto `TransmitFailed`.
    pub(crate) fn into_transmit_failure(self) -> Self {
        match self {
            Error::TransmitFailed(_) => self,
            other => Error::TransmitFailed(other.code()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InitFailed { code, message } => {
                write!(f, "bus init failed ({code:#x}): {message}")
            }
            Error::TransmitFailed(code) => write!(f, "color transmit failed ({code:#x})"),
            Error::OutOfMemory => f.write_str("unable to allocate frame buffer"),
            Error::InvalidArg => f.write_str("invalid argument"),
            Error::InvalidState => f.write_str("invalid state"),
            Error::NotSupported => f.write_str("not supported by this bus"),
            Error::Closed => f.write_str("bus has been deinitialised"),
            Error::Bus(op) => write!(f, "bus {op} failed"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::InitFailed { code, message } => {
                defmt::write!(f, "InitFailed({=i32:#x}, {=str})", code, message.as_str())
            }
            Error::TransmitFailed(code) => defmt::write!(f, "TransmitFailed({=i32:#x})", code),
            Error::OutOfMemory => defmt::write!(f, "OutOfMemory"),
            Error::InvalidArg => defmt::write!(f, "InvalidArg"),
            Error::InvalidState => defmt::write!(f, "InvalidState"),
            Error::NotSupported => defmt::write!(f, "NotSupported"),
            Error::Closed => defmt::write!(f, "Closed"),
            Error::Bus(op) => defmt::write!(f, "Bus({=str})", op),
        }
    }
}
