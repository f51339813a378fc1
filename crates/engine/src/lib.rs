//! The core of a pipelined HTTP/1.x server engine.
//!
//! The engine turns a byte stream into a sequence of requests, hands each one to an
//! application [`handler::Handler`], and frames the response the application writes. It is
//! built around a few pieces:
//!
//! - [`buffer`]: pooled memory blocks and the bounded byte pipes between the transport and the
//!   request loop, giving backpressure in both directions
//! - [`codec`]: the request-line and header parser, and the body decoders and encoders
//! - [`headers`]: a header dictionary with fast paths for well-known header names
//! - [`timeout`]: keep-alive, header and body timeouts plus minimum data rates, all driven by
//!   one heartbeat instead of per-connection timers
//! - [`connection`]: the per-connection request loop and the [`connection::HttpContext`] the
//!   application works with
//! - [`server`]: engine-wide state, graceful shutdown and a TCP accept loop
//!
//! # Example
//!
//! ```no_run
//! use futures::FutureExt;
//! use http::HeaderValue;
//! use micro_engine::config::EngineConfig;
//! use micro_engine::handler::make_handler;
//! use micro_engine::protocol::BoxError;
//! use tokio::net::TcpListener;
//! use tracing::{Level, error, info};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(listener) => listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = make_handler(|ctx| {
//!         async move {
//!             info!(path = ctx.path(), "receiving request");
//!             ctx.response_headers_mut().set("Content-Type", HeaderValue::from_static("text/plain"))?;
//!             ctx.write(b"Hello World!\r\n").await?;
//!             Ok::<_, BoxError>(())
//!         }
//!         .boxed()
//!     });
//!
//!     if let Err(e) = micro_engine::server::serve(listener, handler, EngineConfig::default()).await {
//!         error!(cause = %e, "invalid configuration");
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - [`protocol::HttpError`]: top-level error type
//! - [`protocol::BadRequest`]: a rejected request, always answered with its status before the
//!   connection closes
//! - [`protocol::ResponseError`]: misuse of the response, such as writing more bytes than
//!   declared

pub mod buffer;
pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod headers;
pub mod protocol;
pub mod server;
pub mod timeout;

mod utils;
