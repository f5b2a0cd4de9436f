/// Integration tests for trajectory ingestion, sim assembly and prediction
///
/// Run with: cargo test --test integration_tests -- --nocapture
use axum::{extract::Query, http::StatusCode, routing::get, Router};
use std::{
    collections::HashMap,
    io::Write,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use traj_predictor::{
    server::{self, AppState},
    trajectory::{load_routes, parse_route},
    types::PredictResponse,
    BoundingBox, Car, Error, MapClient, NormalizationStats, Point, PredictionDispatcher,
    Predictor, SimConfigAssembler, SimOptions, Trajectory,
};

const TILE: &[u8] = b"PAR1\x00roads\x00PAR1";

/// Fake road-tile service: echoes the tile bytes when all four bbox
/// parameters are present, counts every hit.
async fn spawn_map_server(hits: Arc<AtomicUsize>, status: StatusCode) -> String {
    let app = Router::new().route(
        "/get_roads_in_bbox.parquet",
        get(move |Query(q): Query<HashMap<String, String>>| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                let complete = ["lat1", "lon1", "lat2", "lon2"]
                    .iter()
                    .all(|k| q.contains_key(*k));
                if !complete {
                    return (StatusCode::BAD_REQUEST, Vec::new());
                }
                (status, TILE.to_vec())
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn rome_bbox() -> (Point, Point) {
    (Point::new(41.999799, 12.627589), Point::new(41.774020, 12.361253))
}

/// One-row input stats of width 3 and a 2-step output horizon; each model
/// echoes its index and the normalized input sum.
fn dispatcher(loads: Arc<AtomicUsize>) -> PredictionDispatcher<impl traj_predictor::Forecaster> {
    let input = NormalizationStats::new(vec![0.0, 41.0, 12.0], vec![1.0, 1.0, 1.0]).unwrap();
    let output = NormalizationStats::new(vec![10.0, 20.0], vec![4.0, 4.0]).unwrap();
    PredictionDispatcher::new(input, output, 2, move |index| {
        loads.fetch_add(1, Ordering::SeqCst);
        Ok(move |x: &[f32]| -> anyhow::Result<Vec<f32>> {
            Ok(vec![index as f32, x.iter().sum::<f32>()])
        })
    })
    .unwrap()
}

fn routes() -> Vec<Trajectory> {
    let lines = [
        "[[1000, 41.9, 12.5], [1010, 41.91, 12.51], [1030, 41.92, 12.52]]",
        "[[50, 41.8, 12.4], [60, 41.81, 12.41], [70, 41.82, 12.42], [95, 41.83, 12.43]]",
    ];
    lines
        .iter()
        .map(|l| Trajectory::from_samples(&parse_route(l).unwrap()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_assemble_full_flow() {
    println!("\n=== Test: Assemble Full Flow ===");
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_map_server(hits.clone(), StatusCode::OK).await;
    let loads = Arc::new(AtomicUsize::new(0));

    let (ne, sw) = rome_bbox();
    let cars = Car::fleet(routes());
    let sim = SimConfigAssembler::new(MapClient::new(base.clone()))
        .assemble(
            BoundingBox { north_east: ne, south_west: sw },
            cars,
            dispatcher(loads.clone()).into_shared(),
            SimOptions {
                predict_n: 2,
                projection_to: Some("EPSG:4806".into()),
                ..Default::default()
            },
        )
        .await
        .expect("assembly should succeed");

    assert_eq!(hits.load(Ordering::SeqCst), 1, "map fetched exactly once");
    assert_eq!(sim.map().as_ref(), TILE, "payload passed through unmodified");
    assert_eq!(sim.cars().len(), 2);
    assert_eq!(sim.cars()[1].index, 1);
    assert_eq!(sim.step_delta(), Duration::from_secs(60));
    assert_eq!(sim.projection_from(), "EPSG:4326");
    assert_eq!(sim.projection_to(), Some("EPSG:4806"));
    assert_eq!(sim.server_url(), base);
    for car in sim.cars() {
        for p in car.trajectory.points() {
            assert!(sim.bbox().contains(&p), "vehicle {} leaves the box at {:?}", car.index, p);
        }
    }
    println!("✓ Assembled {:?}", sim);

    // Engine side: observation window from the car's trajectory, then predict
    let car = &sim.cars()[1];
    let obs = car.trajectory.observation_window(2).unwrap();
    let forecast = sim.predict(car.index, &obs).unwrap();
    assert_eq!(forecast.len(), sim.predict_n());
    assert_eq!(forecast[0], 10.0 + 1.0 * 2.0);
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    println!("✓ Forecast for vehicle {}: {:?}", car.index, forecast);
}

#[tokio::test]
async fn test_swapped_corners_fail_before_fetch() {
    println!("\n=== Test: Swapped Corners ===");
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_map_server(hits.clone(), StatusCode::OK).await;

    let (ne, sw) = rome_bbox();
    let result = SimConfigAssembler::new(MapClient::new(base))
        .assemble(
            BoundingBox { north_east: sw, south_west: ne },
            Car::fleet(routes()),
            dispatcher(Arc::new(AtomicUsize::new(0))).into_shared(),
            SimOptions { predict_n: 2, ..Default::default() },
        )
        .await;

    assert!(matches!(result, Err(Error::InvalidBoundingBox(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 0, "no request for an invalid box");
    println!("✓ Rejected without touching the network");
}

#[tokio::test]
async fn test_map_server_error_is_fatal() {
    println!("\n=== Test: Map Server Error ===");
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_map_server(hits.clone(), StatusCode::SERVICE_UNAVAILABLE).await;

    let (ne, sw) = rome_bbox();
    let result = SimConfigAssembler::new(MapClient::new(base))
        .assemble(
            BoundingBox::new(ne, sw).unwrap(),
            Vec::new(),
            dispatcher(Arc::new(AtomicUsize::new(0))).into_shared(),
            SimOptions { predict_n: 2, ..Default::default() },
        )
        .await;

    assert!(matches!(result, Err(Error::MapFetch(_))));
    assert_eq!(hits.load(Ordering::SeqCst), 1, "no automatic retry");
}

#[tokio::test]
async fn test_unreachable_map_server_is_fatal() {
    println!("\n=== Test: Unreachable Map Server ===");
    // Bind then drop to get a local port with nothing listening
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let (ne, sw) = rome_bbox();
    let result = SimConfigAssembler::new(MapClient::new(format!("http://{addr}")))
        .assemble(
            BoundingBox::new(ne, sw).unwrap(),
            Car::fleet(routes()),
            dispatcher(Arc::new(AtomicUsize::new(0))).into_shared(),
            SimOptions { predict_n: 2, ..Default::default() },
        )
        .await;

    match result {
        Err(Error::MapFetch(e)) => assert!(e.is_connect() || e.is_request(), "{e}"),
        other => panic!("expected MapFetch, got {:?}", other.map(|s| s.cars().len())),
    }
    println!("✓ Connection failure surfaced as MapFetch");
}

#[tokio::test]
async fn test_horizon_mismatch_rejected() {
    let (ne, sw) = rome_bbox();
    let result = SimConfigAssembler::new(MapClient::new("http://127.0.0.1:9"))
        .assemble(
            BoundingBox::new(ne, sw).unwrap(),
            Vec::new(),
            dispatcher(Arc::new(AtomicUsize::new(0))).into_shared(),
            SimOptions { predict_n: 5, ..Default::default() },
        )
        .await;
    assert!(matches!(result, Err(Error::DimensionMismatch { expected: 5, got: 2 })));
}

#[test]
fn test_concurrent_predictions_single_load_per_vehicle() {
    println!("\n=== Test: Concurrent Predictions ===");
    let loads = Arc::new(AtomicUsize::new(0));
    let d = dispatcher(loads.clone());

    std::thread::scope(|s| {
        let d = &d;
        for t in 0..8 {
            s.spawn(move || {
                for step in 0..20 {
                    let idx = (t + step) % 3;
                    let out = d.predict(idx, &[1.0, 41.0, 12.0]).unwrap();
                    assert_eq!(out.len(), 2);
                    assert_eq!(out[0], 10.0 + 2.0 * idx as f32);
                }
            });
        }
    });

    assert_eq!(loads.load(Ordering::SeqCst), 3, "one load per vehicle index");
    assert_eq!(d.models().len(), 3);
    println!("✓ 160 predictions, 3 model loads");
}

#[tokio::test]
async fn test_service_concurrent_requests() {
    println!("\n=== Test: Prediction Service ===");
    let loads = Arc::new(AtomicUsize::new(0));
    let app = server::router(AppState {
        predictor: dispatcher(loads.clone()).into_shared(),
        log_pred: false,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/predict", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let client = reqwest::Client::new();
    let requests = (0..12).map(|i| {
        let client = client.clone();
        let url = url.clone();
        async move {
            client
                .post(url)
                .json(&serde_json::json!({ "index": i % 2, "observations": [0.0, 41.0, 12.0] }))
                .send()
                .await
                .unwrap()
                .json::<PredictResponse>()
                .await
                .unwrap()
        }
    });
    let responses = futures::future::join_all(requests).await;

    for (i, r) in responses.iter().enumerate() {
        assert_eq!(r.index, i % 2);
        assert_eq!(r.forecast, vec![10.0 + 2.0 * (i % 2) as f32, 20.0]);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    println!("✓ {} responses served", responses.len());
}

#[test]
fn test_load_routes_file() {
    println!("\n=== Test: Routes File ===");
    let path = std::env::temp_dir().join(format!("traj_predictor_routes_{}.jsonl", std::process::id()));
    {
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[[1000, 41.9, 12.5], [1010, 41.91, 12.51], [1030, 41.92, 12.52]]").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "[[7, 41.0, 12.0]]").unwrap();
    }

    let trajectories = load_routes(&path).unwrap();
    assert_eq!(trajectories.len(), 2);
    let offsets: Vec<_> = trajectories[0].offsets().collect();
    assert_eq!(
        offsets,
        vec![Duration::ZERO, Duration::from_secs(10), Duration::from_secs(30)]
    );
    assert_eq!(trajectories[1].len(), 1);

    std::fs::write(&path, "[[10, 41.0, 12.0], [5, 41.0, 12.0]]\n").unwrap();
    let err = load_routes(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("line 1"));

    std::fs::remove_file(&path).ok();
    println!("✓ Routes file loaded and validated");
}
