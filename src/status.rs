//! Operation status reports.
//!
//! [`Status`] is the value-level view of an operation outcome: exactly one
//! [`Code`] plus an optional chain of message fragments. Library calls return
//! [`crate::Result`]; `Status` is what a caller-facing layer hands across a
//! boundary that cannot carry a Rust error.

use std::fmt;

use crate::error::{Error, Result};

/// Outcome category of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Corruption,
    IoError,
}

impl Code {
    fn label(self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::NotFound => "NotFound",
            Code::AlreadyExists => "Already exists",
            Code::InvalidArgument => "Invalid argument",
            Code::Corruption => "Corruption",
            Code::IoError => "IO error",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A status code with its message chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    messages: Vec<String>,
}

impl Status {
    const DELIMITER: &'static str = ": ";

    pub fn new(code: Code) -> Self {
        Self {
            code,
            messages: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Code::Ok)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(Code::NotFound).with_message(msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument).with_message(msg)
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::new(Code::Corruption).with_message(msg)
    }

    /// Append a message fragment. Empty fragments are skipped.
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if !msg.is_empty() {
            self.messages.push(msg);
        }
        self
    }

    /// Status of a completed operation.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::from(e),
        }
    }

    /// Status of a lookup, where `Ok(None)` reports NotFound.
    pub fn from_lookup<T>(result: &Result<Option<T>>) -> Self {
        match result {
            Ok(Some(_)) => Self::ok(),
            Ok(None) => Self::new(Code::NotFound),
            Err(e) => Self::from(e),
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Code::NotFound
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.code == Code::InvalidArgument
    }

    pub fn is_corruption(&self) -> bool {
        self.code == Code::Corruption
    }

    pub fn is_io_error(&self) -> bool {
        self.code == Code::IoError
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        Self::new(err.code()).with_message(err.detail())
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code.label())?;
        for msg in &self.messages {
            f.write_str(Self::DELIMITER)?;
            f.write_str(msg)?;
        }
        Ok(())
    }
}
