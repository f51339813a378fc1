//! HTTP body handling for request and response payloads.
//!
//! # Components
//!
//! ## Decoders
//! - [`PayloadDecoder`]: reads a request body framed by Content-Length or chunked transfer
//!   encoding, straight out of the segmented input buffer
//!
//! ## Encoders
//! - [`PayloadEncoder`]: frames a response body as declared length, chunked, until-close or
//!   no body, holding the application to the declared Content-Length

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
