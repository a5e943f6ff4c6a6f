//! Application error type.
//!
//! Every fallible operation returns `Result<_, AppError>`. The error carries the
//! process exit code used by the `psdfit` binary:
//!
//! - `2`: invalid input, configuration or I/O
//! - `3`: insufficient data (too few frequency points, missing fits)
//! - `4`: numerical failure (singular systems, non-finite results)

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Invalid input, configuration or I/O.
    pub fn input(message: impl Into<String>) -> Self {
        Self::new(2, message)
    }

    /// Not enough data to carry out the operation.
    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(3, message)
    }

    /// Numerical failure.
    pub fn numerical(message: impl Into<String>) -> Self {
        Self::new(4, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_exit_codes() {
        assert_eq!(AppError::input("x").exit_code(), 2);
        assert_eq!(AppError::insufficient("x").exit_code(), 3);
        assert_eq!(AppError::numerical("x").exit_code(), 4);
        assert_eq!(AppError::input("bad file").to_string(), "bad file");
    }
}
