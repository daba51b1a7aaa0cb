// File: src/errors.rs
//
// Non-contract plumbing errors: file I/O and REPL line-editing failures.
// Compile and runtime diagnostics are a separate, exact wire format (see
// `compiler.rs`/`vm.rs`) and deliberately do not flow through this type —
// wrapping them here would risk reformatting text that callers depend on.

use std::fmt;

#[derive(Debug)]
pub enum NahError {
    Io(std::io::Error),
    Readline(String),
}

impl fmt::Display for NahError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NahError::Io(err) => write!(f, "{err}"),
            NahError::Readline(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for NahError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NahError::Io(err) => Some(err),
            NahError::Readline(_) => None,
        }
    }
}

impl From<std::io::Error> for NahError {
    fn from(err: std::io::Error) -> Self {
        NahError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_displays_the_underlying_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: NahError = io_err.into();
        assert_eq!(err.to_string(), "no such file");
    }
}
