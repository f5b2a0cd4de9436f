use anyhow::Context;
use tracing_subscriber::EnvFilter;

use traj_predictor::{
    config::{self, Settings},
    model::TorchForecaster,
    server::{self, AppState},
    trajectory::load_routes,
    Car, MapClient, PredictionDispatcher, Predictor, SimConfigAssembler, StatsArtifact,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load(Settings::path_from_env())?;
    let port = config::port_from_env();

    let stats = StatsArtifact::load(&settings.stats_path)?;
    let cars = Car::fleet(load_routes(&settings.routes_path)?);

    let in_dim = settings.observation_len * 3;
    if stats.input.len() != 3 && stats.input.len() != in_dim {
        tracing::warn!(
            "input stats cover {} features; observations have {} ({} rows of 3)",
            stats.input.len(),
            in_dim,
            settings.observation_len
        );
    }

    let model_dir = settings.model_dir.clone();
    let dispatcher = PredictionDispatcher::new(stats.input, stats.output, settings.predict_n, move |index| {
        let path = TorchForecaster::artifact_path(&model_dir, index);
        TorchForecaster::load(&path, in_dim)
    })?;

    // Warmup the first vehicle's model so a broken artifact fails at startup
    if let Some(car) = cars.first() {
        if let Some(obs) = car.trajectory.observation_window(settings.observation_len) {
            dispatcher
                .predict(car.index, &obs)
                .with_context(|| format!("warmup forecast for vehicle {} failed", car.index))?;
            tracing::info!("warmup forward ok");
        }
    }

    let assembler = SimConfigAssembler::new(MapClient::new(settings.map_url.clone()));
    let sim = assembler
        .assemble(settings.bbox()?, cars, dispatcher.into_shared(), settings.sim_options()?)
        .await?;
    tracing::info!("{:?}", sim);

    let app = server::router(AppState::new(sim.predictor().clone()));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
