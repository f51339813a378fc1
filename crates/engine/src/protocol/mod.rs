//! Core HTTP protocol abstractions: request and response heads, payload items and the
//! error types shared by the engine.

mod error;
mod message;
mod request;
mod response;

pub use error::{
    ApplicationErrors, BadRequest, BoxError, HeaderError, HttpError, PanicError, PipeError, RequestRejectionReason,
    ResponseError,
};
pub use message::{PayloadItem, PayloadSize};
pub use request::{RequestHead, TargetForm};
pub use response::ResponseHead;
