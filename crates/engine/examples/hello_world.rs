use futures::FutureExt;
use http::HeaderValue;
use micro_engine::config::EngineConfig;
use micro_engine::handler::make_handler;
use micro_engine::protocol::BoxError;
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

const BODY: &[u8] = b"Hello World!\r\n";

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8080, "start listening");
    let listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let handler = make_handler(|ctx| {
        async move {
            info!(method = %ctx.method(), path = ctx.path(), "receiving request");
            let headers = ctx.response_headers_mut();
            headers.set("Content-Type", HeaderValue::from_static("text/plain; charset=utf-8"))?;
            headers.set("Content-Length", HeaderValue::from(BODY.len()))?;
            ctx.write(BODY).await?;
            Ok::<_, BoxError>(())
        }
        .boxed()
    });

    match micro_engine::server::serve(listener, handler, EngineConfig::default()).await {
        Ok(true) => info!("server stopped"),
        Ok(false) => info!("server stopped, some connections were aborted"),
        Err(e) => error!(cause = %e, "invalid configuration"),
    }
}
