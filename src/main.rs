use std::sync::Arc;

use timeseries_mcp_gateway::{
    build_app, build_dispatcher,
    config::{Config, TransportKind},
    domain::StoreContext,
    influx_client::InfluxClient,
    logging,
    stdio::StdioTransport,
    AppState,
};
use tracing::{info, info_span};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let store = Arc::new(InfluxClient::new(
        config.influxdb_url.clone(),
        config.influxdb_token.clone(),
    ));
    let context = StoreContext::new(store, config.influxdb_org.clone());
    let dispatcher = build_dispatcher(&context)?;

    match config.transport {
        TransportKind::Stdio => {
            info!(influxdb_url = %config.influxdb_url, "gateway starting on stdio");
            StdioTransport::new(dispatcher, info_span!("stdio"))
                .serve_stdio()
                .await?;
        }
        TransportKind::Http => {
            let bind_socket = config.bind_socket()?;
            let state = AppState::new(dispatcher, config.origin_policy());
            let app = build_app(state);
            let listener = tokio::net::TcpListener::bind(bind_socket).await?;

            info!(
                bind_addr = %config.bind_addr,
                bind_port = config.bind_port,
                influxdb_url = %config.influxdb_url,
                "gateway starting on http"
            );

            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}
