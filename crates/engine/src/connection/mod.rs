//! Connection handling: the transport pumps, the HTTP/1.x request loop and the context the
//! application works with.

mod context;
mod control;
mod frame;
mod http1;
mod output;
mod transport;

pub use context::HttpContext;
pub use control::ConnectionControl;
pub use frame::{OnCompleted, OnStarting};
pub use transport::HttpConnection;
