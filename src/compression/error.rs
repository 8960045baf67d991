use std::io;
use thiserror::Error;

/// Errors that may occur when compressing an image.
///
/// Every error is reported before anything is written to the destination.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The image exceeds one of the limits of the format.
    #[error("{what} is {value}, but the format supports at most {max}")]
    SizeLimitExceeded {
        what: &'static str,
        value: usize,
        max: usize,
    },
    /// A parameter has a value that the format can not express.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A caller-supplied buffer is smaller than required.
    #[error("the buffer holds {actual} elements, but {required} are required")]
    BufferUnderflow { required: usize, actual: usize },
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}

impl CompressionError {
    /// Fails with `SizeLimitExceeded` unless `value < limit`.
    pub(crate) fn check_below(
        what: &'static str,
        value: u32,
        limit: u32,
    ) -> Result<(), CompressionError> {
        if value < limit {
            Ok(())
        } else {
            Err(CompressionError::SizeLimitExceeded {
                what,
                value: value as usize,
                max: limit as usize - 1,
            })
        }
    }
}

/// Errors that may occur when opening a compressed image.
#[derive(Debug, Error)]
pub enum DecompressionError {
    /// The compressed data is shorter than its header claims.
    #[error("the compressed image needs {required} bytes, but only {actual} are available")]
    BufferUnderflow { required: usize, actual: usize },
    /// The header describes an image that the format can not contain.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}
