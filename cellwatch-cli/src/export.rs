//! JSON output: one line per snapshot for `--print`, and a summary
//! document for `--export`.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use cellwatch_core::types::TelemetrySnapshot;
use cellwatch_core::SafetyIndicator;
use serde_json::{json, Map, Value};

/// Write `snapshot` to `out` as a single JSON line.
pub fn write_line(out: &mut impl Write, snapshot: &TelemetrySnapshot) -> Result<()> {
    serde_json::to_writer(&mut *out, snapshot)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

pub fn print_line(snapshot: &TelemetrySnapshot) -> Result<()> {
    write_line(&mut io::stdout().lock(), snapshot)
}

/// Build the export document: a summary block followed by the full record.
pub fn export_document(snapshot: &TelemetrySnapshot, source: &str) -> Result<Value> {
    let telemetry = &snapshot.telemetry;
    let indicator = SafetyIndicator::from_safety(telemetry.safety.as_ref());

    let mut summary = Map::new();
    summary.insert("source".to_string(), json!(source));
    summary.insert("status".to_string(), json!(snapshot.liveness.status.as_str()));
    summary.insert(
        "last_message_at".to_string(),
        json!(snapshot.liveness.last_message_at.map(|t| t.to_rfc3339())),
    );
    summary.insert(
        "safety".to_string(),
        json!(telemetry.safety.as_ref().map(|s| s.as_str().to_string())),
    );
    summary.insert("safety_indicator".to_string(), json!(indicator.as_str()));
    summary.insert(
        "machine_state".to_string(),
        json!(telemetry.system.machine_state.as_ref().map(|s| s.as_str().to_string())),
    );
    summary.insert("received".to_string(), json!(snapshot.stats.received));
    summary.insert("applied".to_string(), json!(snapshot.stats.applied));
    summary.insert("malformed".to_string(), json!(snapshot.stats.malformed));
    summary.insert("stale".to_string(), json!(snapshot.stats.stale));
    summary.insert(
        "transport_errors".to_string(),
        json!(snapshot.stats.transport_errors),
    );

    let mut export = Map::new();
    export.insert("summary".to_string(), Value::Object(summary));
    export.insert("telemetry".to_string(), serde_json::to_value(telemetry)?);
    Ok(Value::Object(export))
}

/// Write the export document for `snapshot` to `path`.
pub fn write_snapshot(path: &Path, snapshot: &TelemetrySnapshot, source: &str) -> Result<()> {
    let document = export_document(snapshot, source)?;
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(&mut file, &document)?;
    writeln!(file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellwatch_core::types::{LinkStatus, MachineState, SafetyState};
    use chrono::{TimeZone, Utc};

    fn sample() -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::default();
        snapshot.liveness.status = LinkStatus::Online;
        snapshot.liveness.last_message_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        snapshot.telemetry.safety = Some(SafetyState::ProtectiveStop);
        snapshot.telemetry.system.machine_state = Some(MachineState::Running);
        snapshot.stats.received = 3;
        snapshot.stats.applied = 2;
        snapshot.stats.malformed = 1;
        snapshot
    }

    #[test]
    fn test_write_line_is_single_json_line() {
        let mut out = Vec::new();
        write_line(&mut out, &sample()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.lines().count(), 1);

        let value: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["liveness"]["status"], "ONLINE");
        assert_eq!(value["stats"]["applied"], 2);
    }

    #[test]
    fn test_export_summary() {
        let document = export_document(&sample(), "mqtt://broker:1883").unwrap();
        let summary = &document["summary"];

        assert_eq!(summary["source"], "mqtt://broker:1883");
        assert_eq!(summary["status"], "ONLINE");
        assert_eq!(summary["safety"], "PROTECTIVE_STOP");
        assert_eq!(summary["safety_indicator"], "stop");
        assert_eq!(summary["machine_state"], "RUNNING");
        assert_eq!(summary["malformed"], 1);
        assert!(document["telemetry"]["joints"].is_object());
    }

    #[test]
    fn test_export_without_data() {
        let document = export_document(&TelemetrySnapshot::default(), "stdin").unwrap();
        let summary = &document["summary"];

        assert_eq!(summary["status"], "OFFLINE");
        assert!(summary["last_message_at"].is_null());
        assert!(summary["safety"].is_null());
        assert_eq!(summary["safety_indicator"], "not_available");
    }

    #[test]
    fn test_write_snapshot_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final.json");

        write_snapshot(&path, &sample(), "recording.jsonl").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["summary"]["received"], 3);
        assert_eq!(value["summary"]["source"], "recording.jsonl");
    }
}
