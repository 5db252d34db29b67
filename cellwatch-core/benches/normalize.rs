use std::time::Instant;

use cellwatch_core::types::CanonicalTelemetry;
use cellwatch_core::{CodeTables, MonitorConfig, Normalizer, TelemetryStore};
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

fn simulator_payload(events: usize) -> Value {
    let eventos: Vec<Value> = (0..events)
        .map(|i| json!({"hora": format!("10:00:{:02}", i % 60), "msg": format!("evento {}", i)}))
        .collect();
    json!({
        "programa": {"nombre": "paletizado_v2", "status_id": 1, "estado": "PLAYING"},
        "sistema": {
            "modo_operacion": "AUTO",
            "estado_maquina": 7,
            "potencia_total": 512.3,
            "temperatura_control": 41.2,
            "velocidad_tcp": 0.35
        },
        "seguridad": {"safety": 1},
        "tcp": {
            "position": {"x": 0.41, "y": -0.12, "z": 0.33},
            "orientation": {"rx": 0.0, "ry": 3.14, "rz": 0.0},
            "speed": 0.25
        },
        "joints": {
            "positions": [0.0, -1.57, 1.57, 0.0, 1.57, 0.0],
            "temperatures": [31.2, 33.0, 32.4, 30.1, 29.8, 29.5],
            "currents": [0.4, 1.2, 0.9, 0.2, 0.1, 0.1]
        },
        "digital_io": {"inputs": [true, false, false, true, false, false, false, false]},
        "analog_io": {"ai": [0.5, 4.2], "ao": [0.0, 10.0]},
        "herramienta": {"tension": 24.0, "corriente": 450.0},
        "telemetry": {"main_voltage": 48.1, "cpu_load": 23.0, "ciclos": 1200},
        "eventos": eventos
    })
}

fn rtde_payload() -> Value {
    json!({
        "robot_mode": 7,
        "safety_mode": 1,
        "runtime_state": 2,
        "actual_TCP_pose": [0.41, -0.12, 0.33, 0.0, 3.14, 0.0],
        "actual_TCP_speed": [0.01, 0.0, 0.0, 0.0, 0.0, 0.0],
        "actual_q": [0.0, -1.57, 1.57, 0.0, 1.57, 0.0],
        "joint_temperatures": [31.2, 33.0, 32.4, 30.1, 29.8, 29.5],
        "actual_current": [0.4, 1.2, 0.9, 0.2, 0.1, 0.1],
        "actual_digital_input_bits": 9,
        "actual_digital_output_bits": 0
    })
}

/// Benchmark the pure merge for each payload dialect
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let normalizer = Normalizer::new(CodeTables::rtde());
    let previous = CanonicalTelemetry::new();

    let payloads = vec![
        ("simulator", simulator_payload(5)),
        ("simulator_50_events", simulator_payload(50)),
        ("rtde", rtde_payload()),
    ];

    for (name, payload) in payloads {
        group.bench_with_input(BenchmarkId::from_parameter(name), &payload, |b, payload| {
            b.iter(|| black_box(normalizer.normalize(payload, &previous)));
        });
    }
    group.finish();
}

/// Benchmark the full ingest path: decode, merge, diff and publish
fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");
    let bytes = serde_json::to_vec(&simulator_payload(5)).unwrap();
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    let mut store = TelemetryStore::init(&MonitorConfig::default()).unwrap();
    let _reader = store.reader();
    group.bench_function("simulator", |b| {
        b.iter(|| black_box(store.ingest(&bytes, Instant::now(), Utc::now())));
    });
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_ingest);
criterion_main!(benches);
