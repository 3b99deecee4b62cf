use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Opaque structured payload returned by an environmental provider
/// (weather, traffic). Keys serialize in sorted order.
pub type EnvironmentReading = serde_json::Map<String, serde_json::Value>;

/// Calendar breakdown of the moment a snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    /// Local timestamp with microsecond precision, e.g. `2024-05-01 12:34:56.789012`.
    /// The fraction is left out on a whole second: `2024-01-07 00:00:00`.
    pub id: String,
    /// Month of the year (1-12).
    pub month: u32,
    /// Day of the week, Monday = 0 through Sunday = 6.
    pub weekday: u32,
    /// Hour of the day (0-23).
    pub hour: u32,
    /// Minute of the hour (0-59).
    pub minute: u32,
    /// Day of the month (1-31).
    pub day: u32,
}

impl CalendarSnapshot {
    /// Break a local date-time into its calendar fields.
    pub fn at(now: NaiveDateTime) -> Self {
        let id = if now.nanosecond() / 1_000 == 0 {
            now.format("%Y-%m-%d %H:%M:%S")
        } else {
            now.format("%Y-%m-%d %H:%M:%S%.6f")
        };
        Self {
            id: id.to_string(),
            month: now.month(),
            weekday: now.weekday().num_days_from_monday(),
            hour: now.hour(),
            minute: now.minute(),
            day: now.day(),
        }
    }
}

/// Reading from the on-device people counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiReading {
    pub people_count: i64,
}

/// The message body published once per run.
///
/// Field order is the serialization order: `time`, `pi`, `weather`, `traffic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub time: CalendarSnapshot,
    pub pi: PiReading,
    pub weather: EnvironmentReading,
    pub traffic: EnvironmentReading,
}

impl TelemetrySnapshot {
    /// Serialize to the JSON wire payload.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
