//! Domain error types.

mod decoder_error;

pub use decoder_error::DecoderError;
