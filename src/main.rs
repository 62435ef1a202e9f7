use vigil::config::Config;
use vigil::handler::TimingHandler;
use vigil::http::response::Response;
use vigil::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let mut server = Server::from_config(&cfg).await?;
    server.use_handler(TimingHandler::new());
    server.use_fn(|ctx, _next| {
        Box::pin(async move {
            let name = ctx.request().param("name").unwrap_or("world").to_string();
            ctx.set_response(Response::ok(format!("Hello, {name}!\n")));
            Ok(())
        })
    });

    let handle = server.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    handle.shutdown().await;

    Ok(())
}
