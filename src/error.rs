use std::io;

use crate::checkpoint::CheckpointReport;

#[derive(thiserror::Error, Debug)]
pub enum SrmResNetError {
    #[error("tensor operation failed: {0}")]
    Candle(candle_core::Error),

    #[error("could not decode image: {0}")]
    Image(image::ImageError),

    #[error("i/o failure: {0}")]
    Io(io::Error),

    #[error("checkpoint {path} does not match the network: {report}")]
    CheckpointMismatch { path: String, report: CheckpointReport },

    #[error("{0}")]
    Msg(String),
}

impl From<candle_core::Error> for SrmResNetError {
    fn from(value: candle_core::Error) -> Self {
        SrmResNetError::Candle(value)
    }
}

impl From<image::ImageError> for SrmResNetError {
    fn from(value: image::ImageError) -> Self {
        SrmResNetError::Image(value)
    }
}

impl From<io::Error> for SrmResNetError {
    fn from(value: io::Error) -> Self {
        SrmResNetError::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, SrmResNetError>;
