//! Status codes returned across the native boundary

use std::fmt;

use thiserror::Error;

/// HRESULT-compatible status code.
///
/// `#[repr(transparent)]` so thunks can return it directly where native code
/// expects an `HRESULT`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const FALSE: Status = Status(1);
    pub const E_NOTIMPL: Status = Status(0x80004001_u32 as i32);
    pub const E_NOINTERFACE: Status = Status(0x80004002_u32 as i32);
    pub const E_POINTER: Status = Status(0x80004003_u32 as i32);
    pub const E_FAIL: Status = Status(0x80004005_u32 as i32);
    pub const E_BOUNDS: Status = Status(0x8000000B_u32 as i32);
    pub const E_OUTOFMEMORY: Status = Status(0x8007000E_u32 as i32);
    pub const E_INVALIDARG: Status = Status(0x80070057_u32 as i32);
    pub const E_NOT_SUFFICIENT_BUFFER: Status = Status(0x8007007A_u32 as i32);
    /// The object invoked has disconnected from its clients (`RPC_E_DISCONNECTED`).
    /// Returned when a thunk is called through a pointer with no live shadow.
    pub const E_NO_SUCH_OBJECT: Status = Status(0x80010108_u32 as i32);

    #[inline]
    pub const fn code(self) -> i32 {
        self.0
    }

    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub const fn is_err(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn ok(self) -> Result<(), Status> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Status::OK => "S_OK",
            Status::FALSE => "S_FALSE",
            Status::E_NOTIMPL => "E_NOTIMPL",
            Status::E_NOINTERFACE => "E_NOINTERFACE",
            Status::E_POINTER => "E_POINTER",
            Status::E_FAIL => "E_FAIL",
            Status::E_BOUNDS => "E_BOUNDS",
            Status::E_OUTOFMEMORY => "E_OUTOFMEMORY",
            Status::E_INVALIDARG => "E_INVALIDARG",
            Status::E_NOT_SUFFICIENT_BUFFER => "E_NOT_SUFFICIENT_BUFFER",
            Status::E_NO_SUCH_OBJECT => "RPC_E_DISCONNECTED",
            _ => return None,
        })
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0 as u32),
            None => write!(f, "0x{:08X}", self.0 as u32),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for Status {}

impl From<Status> for i32 {
    fn from(status: Status) -> i32 {
        status.0
    }
}

#[cfg(windows)]
impl From<windows::core::HRESULT> for Status {
    fn from(hr: windows::core::HRESULT) -> Self {
        Status(hr.0)
    }
}

#[cfg(windows)]
impl From<Status> for windows::core::HRESULT {
    fn from(status: Status) -> Self {
        windows::core::HRESULT(status.0)
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for Status {
    fn from(err: windows::core::Error) -> Self {
        Status(err.code().0)
    }
}

/// Failure raised by a Rust callback.
///
/// `Status` carries the exact code native code should see; anything else is
/// reported as `E_FAIL`.
#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("callback failed with {0}")]
    Status(Status),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CallbackError {
    /// Status code reported to the native caller
    pub fn status(&self) -> Status {
        match self {
            CallbackError::Status(status) if status.is_err() => *status,
            _ => Status::E_FAIL,
        }
    }
}

impl From<Status> for CallbackError {
    fn from(status: Status) -> Self {
        CallbackError::Status(status)
    }
}

pub type CallbackResult<T> = Result<T, CallbackError>;
