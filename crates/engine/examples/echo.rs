//! Streams the request body back, chunked, and logs when each response is done.

use std::sync::Arc;

use futures::FutureExt;
use micro_engine::config::EngineConfig;
use micro_engine::connection::HttpContext;
use micro_engine::handler::Handler;
use micro_engine::protocol::BoxError;
use micro_engine::server::Server;
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

struct Echo;

impl Handler for Echo {
    type Error = BoxError;

    async fn call(&self, ctx: &mut HttpContext<'_>) -> Result<(), BoxError> {
        let id = ctx.connection_id();
        let target = ctx.raw_target().to_owned();
        ctx.on_completed(move || {
            async move {
                info!(connection_id = id, raw_target = %target, "response completed");
                Ok(())
            }
            .boxed()
        });

        if let Some(content_type) = ctx.request_headers().get("Content-Type").and_then(|v| v.first()).cloned() {
            ctx.response_headers_mut().set("Content-Type", content_type)?;
        }
        while let Some(chunk) = ctx.read_body().await? {
            ctx.write(&chunk).await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let server = match Server::new(EngineConfig::default()) {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "invalid configuration");
            return;
        }
    };

    info!(port = 8080, "start listening");
    let listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(cause = %e, "failed to listen for ctrl-c");
        }
    };
    let graceful = server.serve(listener, Arc::new(Echo), shutdown).await;
    info!(graceful, "server stopped");
}
