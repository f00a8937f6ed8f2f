use faregate_api::app;
use faregate_api::config::AppConfig;

#[tokio::main]
async fn main() {
    faregate_observability::init("faregate-ticketing");

    let config = AppConfig::from_env();
    let runtime = app::build_runtime(&config).await;
    let router = app::build_router(runtime.services.clone(), &config);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    runtime.shutdown().await;
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
