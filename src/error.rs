use thiserror::Error;

/// Errors produced by a filter or estimator run.
#[derive(Error, Debug, PartialEq)]
pub enum NrError {
    /// A pixel plane could not be allocated. Fatal for the run, no partial
    /// image is produced.
    #[error("failed to allocate {0} bytes for a pixel plane")]
    Allocation(usize),

    /// Pixel buffer length does not match the declared image dimensions.
    #[error("pixel buffer has {got} samples, expected {width}x{height}")]
    InvalidBufferLength {
        got: usize,
        width: usize,
        height: usize,
    },

    /// The run was cancelled through its `RunFlag`. Partial results are
    /// discarded, never returned.
    #[error("filter run was cancelled")]
    Cancelled,
}
