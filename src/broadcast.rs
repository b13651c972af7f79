//! Wire messages for live broadcast clients
//!
//! Every frame is one JSON object tagged by `type`:
//! - `meta` once when a client connects
//! - `telemetry` once per broadcast tick
//! - `error` when live data is unavailable, after which the connection closes
//!
//! [`serve_live`] drives one client over any [`Sink`] of text frames, so the
//! same session logic works for WebSockets, SSE, or an in-process channel.

use chrono::SecondsFormat;
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::TelemetryPipeline;
use crate::types::{Snapshot, TelemetryMode, WheelPosition};
use crate::{Result, TelemetryError};

/// Sent instead of telemetry when the source is not connected
pub const UNAVAILABLE_MESSAGE: &str =
    "Live telemetry unavailable. Ensure LMU is running with shared memory enabled.";

/// Session id announced when no snapshot could be read at connect time
pub const UNKNOWN_SESSION: &str = "unknown";

/// One frame sent to a broadcast client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BroadcastMessage {
    Meta(MetaMessage),
    Telemetry(TelemetryMessage),
    Error(ErrorMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct MetaMessage {
    pub mode: TelemetryMode,
    pub session_id: String,
}

/// Flattened player view of a snapshot.
///
/// Fields are zeroed, never omitted, when the snapshot has no player vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct TelemetryMessage {
    pub mode: TelemetryMode,
    /// RFC 3339, millisecond precision
    pub timestamp: String,
    pub session_id: String,
    pub speed_kph: f64,
    pub throttle: f64,
    pub brake: f64,
    pub steering: f64,
    pub fuel_liters: f64,
    /// Mid-tread temperature, FL FR RL RR
    pub tyre_temps: [f64; 4],
    /// World X position
    pub latitude: f64,
    /// World Z position
    pub longitude: f64,
    pub track: String,
    pub session_type: String,
    pub num_vehicles: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ErrorMessage {
    pub message: String,
}

impl BroadcastMessage {
    pub fn meta(session_id: impl Into<String>) -> Self {
        BroadcastMessage::Meta(MetaMessage {
            mode: TelemetryMode::Live,
            session_id: session_id.into(),
        })
    }

    pub fn unavailable() -> Self {
        BroadcastMessage::Error(ErrorMessage { message: UNAVAILABLE_MESSAGE.to_string() })
    }

    pub fn telemetry(snapshot: &Snapshot) -> Self {
        BroadcastMessage::Telemetry(TelemetryMessage::from_snapshot(snapshot))
    }

    /// Serialize as one text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl TelemetryMessage {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let player = snapshot.player_vehicle.as_ref();
        let session = snapshot.session.as_ref();
        let value = |f: fn(&crate::types::VehicleTelemetry) -> f64| player.map_or(0.0, f);

        let mut tyre_temps = [0.0; 4];
        if let Some(player) = player {
            for position in WheelPosition::ALL {
                if let Some(wheel) = player.wheel(position) {
                    tyre_temps[position.index()] = wheel.temp_mid;
                }
            }
        }

        Self {
            mode: TelemetryMode::Live,
            timestamp: snapshot.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            session_id: snapshot.session_id.clone(),
            speed_kph: value(|v| v.speed),
            throttle: value(|v| v.throttle),
            brake: value(|v| v.brake),
            steering: value(|v| v.steering),
            fuel_liters: value(|v| v.fuel),
            tyre_temps,
            latitude: value(|v| v.pos_x),
            longitude: value(|v| v.pos_z),
            track: session.map(|s| s.track_name.clone()).unwrap_or_default(),
            session_type: session.map(|s| s.session_type.clone()).unwrap_or_default(),
            num_vehicles: session.map_or(0, |s| s.num_vehicles),
        }
    }
}

/// Run one live client session until `cancel` fires or the client goes away.
///
/// An unavailable source gets a single error frame and a closed sink.
/// Otherwise the client receives a meta frame, then one telemetry frame per
/// broadcast tick. The sink is closed when the stream ends.
pub async fn serve_live<S>(
    pipeline: &TelemetryPipeline,
    mut sink: S,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: Sink<String> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let send_failed =
        |e: S::Error| TelemetryError::broadcast_failed("send frame", Some(Box::new(e)));

    if !pipeline.reader().source().is_available() {
        info!("Live source unavailable; rejecting client");
        sink.send(BroadcastMessage::unavailable().to_json()?).await.map_err(send_failed)?;
        sink.close().await.map_err(send_failed)?;
        return Ok(());
    }

    let session_id = match pipeline.reader().read().await {
        Some(snapshot) => snapshot.session_id,
        None => UNKNOWN_SESSION.to_string(),
    };
    sink.send(BroadcastMessage::meta(&session_id).to_json()?).await.map_err(send_failed)?;
    info!(session_id = %session_id, "Live client connected");

    let client = cancel.child_token();
    let mut stream = pipeline.stream_for_broadcast(&client)?;
    let mut sent = 0u64;
    let mut failure = None;

    while let Some(snapshot) = stream.next().await {
        if failure.is_some() {
            // Draining after a send failure so the run can flush
            continue;
        }
        let frame = BroadcastMessage::telemetry(&snapshot).to_json()?;
        match sink.send(frame).await {
            Ok(()) => sent += 1,
            Err(e) => {
                warn!(error = %e, sent, "Client send failed; stopping stream");
                client.cancel();
                failure = Some(send_failed(e));
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Client sink already closed");
    }
    info!(sent, "Live client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::LiveReader;
    use crate::source::TelemetrySource;
    use crate::test_utils::{ScriptedSource, SnapshotBuilder, fixture_time, snapshot_with_player};
    use futures::channel::mpsc;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn parse(frame: &str) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    fn pipeline(source: &Arc<ScriptedSource>) -> TelemetryPipeline {
        let reader = LiveReader::new(Arc::clone(source) as Arc<dyn TelemetrySource>);
        TelemetryPipeline::new(reader, None).with_broadcast_interval(Duration::from_millis(20))
    }

    #[test]
    fn telemetry_frame_flattens_player() {
        let mut snapshot = SnapshotBuilder::new("lmu_1").speed(0, 255.5).fuel(0, 36.0).build();
        if let Some(player) = snapshot.player_vehicle.as_mut() {
            player.pos_x = 12.0;
            player.pos_z = -4.5;
            for (i, wheel) in player.wheels.iter_mut().enumerate() {
                wheel.temp_mid = 85.0 + i as f64;
            }
        }

        let json = parse(&BroadcastMessage::telemetry(&snapshot).to_json().unwrap());
        assert_eq!(json["type"], "telemetry");
        assert_eq!(json["mode"], "live");
        assert_eq!(json["sessionId"], "lmu_1");
        assert_eq!(json["speedKph"], 255.5);
        assert_eq!(json["fuelLiters"], 36.0);
        assert_eq!(json["tyreTemps"], serde_json::json!([85.0, 86.0, 87.0, 88.0]));
        assert_eq!(json["latitude"], 12.0);
        assert_eq!(json["longitude"], -4.5);
        assert_eq!(json["track"], "Circuit de la Sarthe");
        assert_eq!(json["sessionType"], "Race");
        assert_eq!(json["numVehicles"], 1);
        assert_eq!(json["timestamp"], "2025-06-14T14:00:00.000Z");
    }

    #[test]
    fn missing_player_zeroes_fields() {
        let snapshot = Snapshot::new("s1", fixture_time());
        let json = parse(&BroadcastMessage::telemetry(&snapshot).to_json().unwrap());

        for key in ["speedKph", "throttle", "brake", "steering", "fuelLiters", "latitude"] {
            assert_eq!(json[key], 0.0, "{}", key);
        }
        assert_eq!(json["tyreTemps"], serde_json::json!([0.0, 0.0, 0.0, 0.0]));
        assert_eq!(json["track"], "");
        assert_eq!(json["numVehicles"], 0);
    }

    #[test]
    fn meta_and_error_frames() {
        let meta = parse(&BroadcastMessage::meta("abc").to_json().unwrap());
        assert_eq!(meta, serde_json::json!({ "type": "meta", "mode": "live", "sessionId": "abc" }));

        let error = parse(&BroadcastMessage::unavailable().to_json().unwrap());
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], UNAVAILABLE_MESSAGE);
    }

    #[test]
    fn frames_parse_back() {
        let message = BroadcastMessage::telemetry(&snapshot_with_player("s1"));
        let parsed: BroadcastMessage = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(parsed, message);
    }

    #[tokio::test]
    async fn unavailable_source_sends_error_then_closes() {
        let source = Arc::new(ScriptedSource::repeating(snapshot_with_player("s1")));
        source.set_available(false);
        let pipeline = pipeline(&source);
        let (tx, rx) = mpsc::unbounded::<String>();

        serve_live(&pipeline, tx, &CancellationToken::new()).await.unwrap();

        let frames: Vec<String> = rx.collect().await;
        assert_eq!(frames.len(), 1);
        assert_eq!(parse(&frames[0])["type"], "error");
        assert_eq!(source.read_calls(), 0);
    }

    #[tokio::test]
    async fn live_session_sends_meta_then_telemetry() {
        let source = Arc::new(ScriptedSource::repeating(snapshot_with_player("lmu_live")));
        let pipeline = pipeline(&source);
        let (tx, rx) = mpsc::unbounded::<String>();
        let cancel = CancellationToken::new();

        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stop.cancel();
        });
        serve_live(&pipeline, tx, &cancel).await.unwrap();

        let frames: Vec<Value> = rx.map(|f| parse(&f)).collect().await;
        assert!(frames.len() >= 2);
        assert_eq!(frames[0]["type"], "meta");
        assert_eq!(frames[0]["sessionId"], "lmu_live");
        assert!(frames[1..].iter().all(|f| f["type"] == "telemetry"));
        assert_eq!(pipeline.current_mode(), TelemetryMode::Idle);
    }

    #[tokio::test]
    async fn no_first_snapshot_announces_unknown_session() {
        let source = Arc::new(ScriptedSource::sequence(Vec::new()));
        let pipeline = pipeline(&source);
        let (tx, rx) = mpsc::unbounded::<String>();
        let cancel = CancellationToken::new();
        cancel.cancel();

        serve_live(&pipeline, tx, &cancel).await.unwrap();

        let frames: Vec<String> = rx.collect().await;
        assert_eq!(parse(&frames[0])["sessionId"], UNKNOWN_SESSION);
    }

    #[tokio::test]
    async fn closed_client_reports_broadcast_error() {
        let source = Arc::new(ScriptedSource::repeating(snapshot_with_player("s1")));
        let pipeline = pipeline(&source);
        let (tx, mut rx) = mpsc::channel::<String>(1);

        let client = tokio::spawn(async move {
            let meta = rx.next().await;
            drop(rx);
            meta
        });
        let result = serve_live(&pipeline, tx, &CancellationToken::new()).await;

        assert!(client.await.unwrap().is_some());
        assert!(matches!(result, Err(TelemetryError::Broadcast { .. })));
        assert_eq!(pipeline.current_mode(), TelemetryMode::Idle);
    }
}
