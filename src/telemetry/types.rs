use std::collections::HashSet;

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, ToSchema)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vector3 { x, y, z }
    }
}

/// Local-level velocity in metres per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, ToSchema)]
pub struct Enu {
    pub east: f64,
    pub north: f64,
    pub up: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, ToSchema)]
pub struct Dop {
    pub gdop: f64,
    pub pdop: f64,
    pub hdop: f64,
    pub vdop: f64,
}

/// One position/velocity/time solution reported by the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PvtFix {
    pub week: u32,
    pub tow_ms: u32,
    /// Receiver time in seconds.
    pub rx_time: f64,
    /// As formatted by the receiver; empty when it sent none.
    pub utc_time: String,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub height_m: f64,
    /// ECEF position in metres.
    pub position: Vector3,
    /// ECEF velocity in metres per second.
    pub velocity: Vector3,
    pub velocity_enu: Enu,
    pub course_over_ground_deg: f64,
    pub clock_offset_s: f64,
    pub clock_drift_ppm: f64,
    /// True for any solution status other than "no solution".
    pub valid: bool,
    pub solution_status: u32,
    pub solution_type: u32,
    pub valid_sats: u32,
    pub dop: Dop,
    pub geohash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
pub struct TrackingFlags {
    pub acquisition_valid: bool,
    pub symbol_valid: bool,
    pub word_valid: bool,
    pub pseudorange_valid: bool,
    /// Carrier phase resolved with the 180 degree ambiguity removed.
    pub pll_180_locked: bool,
}

/// Measurements for one satellite signal.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ObservableRecord {
    /// Constellation letter (`G`, `E`, `R`, `C`, ...).
    pub system: String,
    pub prn: u8,
    /// Two-character signal code, e.g. `1C`.
    pub signal: String,
    pub channel: u16,
    pub tow_ms: u32,
    pub pseudorange_m: f64,
    pub carrier_phase_rads: f64,
    pub doppler_hz: f64,
    pub cn0_dbhz: f64,
    pub tracking: TrackingFlags,
}

impl ObservableRecord {
    pub fn satellite(&self) -> String {
        format!("{}{:02}", self.system, self.prn)
    }
}

/// All records the receiver produced for one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ObservablesSnapshot {
    /// Receiver time of the epoch in whole milliseconds. Orders the history.
    pub sequence: u64,
    /// Receiver time in seconds.
    pub rx_time: f64,
    /// Distinct satellites across `records`; one satellite may carry
    /// several signals.
    pub satellite_count: usize,
    pub records: Vec<ObservableRecord>,
}

impl ObservablesSnapshot {
    pub fn new(rx_time: f64, records: Vec<ObservableRecord>) -> Self {
        let satellite_count = records
            .iter()
            .map(|r| (r.system.as_str(), r.prn))
            .collect::<HashSet<_>>()
            .len();
        ObservablesSnapshot {
            sequence: epoch_ms(rx_time),
            rx_time,
            satellite_count,
            records,
        }
    }
}

/// Negative and non-finite times map to 0.
fn epoch_ms(rx_time: f64) -> u64 {
    if rx_time.is_finite() && rx_time > 0.0 {
        (rx_time * 1000.0).round() as u64
    } else {
        0
    }
}
