//! Realtime event kinds and typed payload schemas.
//!
//! The platform pushes a closed set of vehicle/trip notifications. Each
//! wire payload shares a common base (user, vehicle, device, location) plus
//! kind-specific detail fields. Field decoding is delegated to serde; a
//! payload that does not match its schema is a decode error, never a panic.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Every event name a subscriber may register for.
///
/// `Error` and `Closed` are reserved lifecycle kinds raised by the client
/// itself; the rest arrive from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TripFinished,
    IgnitionOn,
    IgnitionOff,
    Speeding,
    HardBrake,
    HardAccel,
    MilOn,
    MilOff,
    LocationUpdated,
    VehicleStatusReport,
    /// Reserved: a server-sent error message arrived on the channel.
    Error,
    /// Reserved: the connection closed, for any reason.
    Closed,
}

impl EventKind {
    /// The realtime kinds the platform can push, in a fixed order.
    pub const REALTIME: [EventKind; 10] = [
        EventKind::TripFinished,
        EventKind::IgnitionOn,
        EventKind::IgnitionOff,
        EventKind::Speeding,
        EventKind::HardBrake,
        EventKind::HardAccel,
        EventKind::MilOn,
        EventKind::MilOff,
        EventKind::LocationUpdated,
        EventKind::VehicleStatusReport,
    ];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TripFinished => "trip:finished",
            Self::IgnitionOn => "ignition:on",
            Self::IgnitionOff => "ignition:off",
            Self::Speeding => "notification:speeding",
            Self::HardBrake => "notification:hard_brake",
            Self::HardAccel => "notification:hard_accel",
            Self::MilOn => "mil:on",
            Self::MilOff => "mil:off",
            Self::LocationUpdated => "location:updated",
            Self::VehicleStatusReport => "vehicle:status_report",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }

    /// Parse a wire or subscription name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "trip:finished" => Ok(Self::TripFinished),
            "ignition:on" => Ok(Self::IgnitionOn),
            "ignition:off" => Ok(Self::IgnitionOff),
            "notification:speeding" => Ok(Self::Speeding),
            "notification:hard_brake" => Ok(Self::HardBrake),
            "notification:hard_accel" => Ok(Self::HardAccel),
            "mil:on" => Ok(Self::MilOn),
            "mil:off" => Ok(Self::MilOff),
            "location:updated" => Ok(Self::LocationUpdated),
            "vehicle:status_report" => Ok(Self::VehicleStatusReport),
            "error" => Ok(Self::Error),
            "closed" => Ok(Self::Closed),
            _ => Err(Error::UnknownEventKind(name.to_string())),
        }
    }

    /// True for the kinds the platform pushes (not the reserved ones).
    pub fn is_realtime(&self) -> bool {
        !matches!(self, Self::Error | Self::Closed)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared data models
// ─────────────────────────────────────────────────────────────────────────────

/// GPS coordinates with accuracy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub accuracy_m: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One diagnostic trouble code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Dtc {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Vehicle as embedded in realtime payloads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Vehicle {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub vin: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub fuel_level_percent: Option<f64>,
    #[serde(default)]
    pub battery_voltage: Option<f64>,
    #[serde(default)]
    pub active_dtcs: Option<Vec<Dtc>>,
    #[serde(default)]
    pub latest_location: Option<Location>,
}

/// Adapter device that produced the event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Device {
    pub id: String,
}

/// Account owning the vehicle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Reverse-geocoded address attached to trip endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub street_number: Option<String>,
    #[serde(default)]
    pub street_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Driving incident recorded within a trip.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub g_force: Option<f64>,
}

/// Trip summary as embedded in a `trip:finished` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trip {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub distance_m: Option<f64>,
    #[serde(default)]
    pub duration_s: Option<f64>,
    #[serde(default)]
    pub start_location: Option<Location>,
    #[serde(default)]
    pub end_location: Option<Location>,
    #[serde(default)]
    pub start_address: Option<Address>,
    #[serde(default)]
    pub end_address: Option<Address>,
    #[serde(default)]
    pub fuel_cost_usd: Option<f64>,
    #[serde(default)]
    pub fuel_volume_l: Option<f64>,
    #[serde(default)]
    pub average_kmpl: Option<f64>,
    #[serde(default)]
    pub hard_brakes: Option<i64>,
    #[serde(default)]
    pub hard_accels: Option<i64>,
    #[serde(default)]
    pub vehicle_events: Vec<VehicleEvent>,
    #[serde(default)]
    pub start_timezone: Option<String>,
    #[serde(default)]
    pub end_timezone: Option<String>,
    #[serde(default)]
    pub idling_time_s: Option<f64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Realtime event payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Fields shared by every realtime event payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventBase {
    pub id: String,
    pub user: User,
    pub vehicle: Vehicle,
    pub device: Device,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

/// Kind-specific detail fields.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDetail {
    TripFinished { trip: Trip },
    IgnitionOn,
    IgnitionOff,
    Speeding { velocity_kph: f64 },
    HardBrake { g_force: f64 },
    HardAccel { g_force: f64 },
    MilOn { dtcs: Vec<Dtc> },
    MilOff { dtcs: Vec<Dtc>, user_cleared: bool },
    LocationUpdated,
    VehicleStatusReport,
}

/// A fully decoded realtime event.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeEvent {
    pub kind: EventKind,
    pub base: EventBase,
    pub detail: EventDetail,
}

#[derive(Deserialize)]
struct TripDetail {
    trip: Trip,
}

#[derive(Deserialize)]
struct SpeedingDetail {
    velocity_kph: f64,
}

#[derive(Deserialize)]
struct GForceDetail {
    g_force: f64,
}

#[derive(Deserialize)]
struct MilOnDetail {
    dtcs: Vec<Dtc>,
}

#[derive(Deserialize)]
struct MilOffDetail {
    dtcs: Vec<Dtc>,
    user_cleared: bool,
}

impl RealtimeEvent {
    /// Decode the payload of an event packet for a known realtime kind.
    ///
    /// The reserved kinds have no payload schema and are rejected as a
    /// protocol fault.
    pub fn decode(kind: EventKind, payload: &Value) -> Result<Self> {
        let bad = |e: serde_json::Error| {
            Error::Protocol(format!("event {kind} does not match schema: {e}"))
        };

        let base: EventBase = serde_json::from_value(payload.clone()).map_err(bad)?;
        let detail = match kind {
            EventKind::TripFinished => {
                let d: TripDetail = serde_json::from_value(payload.clone()).map_err(bad)?;
                EventDetail::TripFinished { trip: d.trip }
            }
            EventKind::IgnitionOn => EventDetail::IgnitionOn,
            EventKind::IgnitionOff => EventDetail::IgnitionOff,
            EventKind::Speeding => {
                let d: SpeedingDetail = serde_json::from_value(payload.clone()).map_err(bad)?;
                EventDetail::Speeding {
                    velocity_kph: d.velocity_kph,
                }
            }
            EventKind::HardBrake => {
                let d: GForceDetail = serde_json::from_value(payload.clone()).map_err(bad)?;
                EventDetail::HardBrake { g_force: d.g_force }
            }
            EventKind::HardAccel => {
                let d: GForceDetail = serde_json::from_value(payload.clone()).map_err(bad)?;
                EventDetail::HardAccel { g_force: d.g_force }
            }
            EventKind::MilOn => {
                let d: MilOnDetail = serde_json::from_value(payload.clone()).map_err(bad)?;
                EventDetail::MilOn { dtcs: d.dtcs }
            }
            EventKind::MilOff => {
                let d: MilOffDetail = serde_json::from_value(payload.clone()).map_err(bad)?;
                EventDetail::MilOff {
                    dtcs: d.dtcs,
                    user_cleared: d.user_cleared,
                }
            }
            EventKind::LocationUpdated => EventDetail::LocationUpdated,
            EventKind::VehicleStatusReport => EventDetail::VehicleStatusReport,
            EventKind::Error | EventKind::Closed => {
                return Err(Error::Protocol(format!(
                    "reserved kind {kind} has no realtime payload"
                )));
            }
        };

        Ok(Self { kind, base, detail })
    }
}
