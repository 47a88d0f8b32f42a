use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use model_serving::config::ServeConfig;
use model_serving::model::ModelResolver;
use model_serving::server::{self, ServingContext};
use model_serving::telemetry::init_tracing;
use model_serving::tracking::HttpTracking;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServeConfig::parse();
    init_tracing();
    info!(
        tracking_uri = %config.tracking_uri,
        experiment = %config.experiment_name,
        "starting model-serving"
    );

    let tracking = HttpTracking::new(&config.tracking_uri);
    let resolver = ModelResolver::new(&config.experiment_name).artifact_path(&config.artifact_path);
    let resolved = resolver.resolve(&tracking).await.with_context(|| {
        format!(
            "resolving model for experiment '{}' at {}",
            resolver.experiment_name(),
            config.tracking_uri
        )
    })?;

    let context = ServingContext::new(tracking, resolved).with_metric_key(&config.metric_key);
    let app = server::router(Arc::new(context), config.body_limit_bytes);

    server::serve(config.listen_addr(), app)
        .await
        .context("prediction server failed")
}
