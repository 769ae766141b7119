//! Synthetic telemetry source.
//!
//! Sends PVT and observables datagrams in the configured wire layout, so the
//! relay and its front-end can be exercised without a receiver attached.

use std::f64::consts::PI;
use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;

use crate::config::TelemetryConfig;
use crate::telemetry::{
    encode_observables, encode_pvt, Dop, Enu, ObservableRecord, ObservablesSnapshot, PvtFix,
    TrackingFlags, Vector3, WireLayout,
};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_E2: f64 = 6.694_379_990_14e-3;
const SPEED_OF_LIGHT: f64 = 299_792_458.0;
const L1_HZ: f64 = 1_575.42e6;
const WEEK_MS: u64 = 604_800_000;
/// 1980-01-06T00:00:00Z.
const GPS_EPOCH_UNIX_MS: i64 = 315_964_800_000;
/// GPS time runs ahead of UTC by the leap seconds since 1980.
const LEAP_SECONDS: i64 = 18;

/// Satellites in view: (system, prn, signal, base C/N0).
const SKY: [(&str, u8, &str, f64); 8] = [
    ("G", 2, "1C", 44.0),
    ("G", 5, "1C", 47.5),
    ("G", 13, "1C", 39.0),
    ("G", 24, "1C", 42.0),
    ("G", 29, "1C", 36.5),
    ("E", 11, "1B", 43.0),
    ("E", 24, "1B", 40.5),
    ("E", 33, "1B", 38.0),
];

pub struct Simulation {
    layout: WireLayout,
    origin: (f64, f64, f64),
    /// GPS milliseconds since the GPS epoch at tick 0.
    start_gps_ms: u64,
    tick: u32,
    interval: Duration,
}

impl Simulation {
    /// Epoch timestamps count from `start`.
    pub fn new(layout: WireLayout, interval: Duration, start: DateTime<Utc>) -> Self {
        Simulation {
            layout,
            origin: (41.275, 1.987, 82.0),
            start_gps_ms: gps_ms(start),
            tick: 0,
            interval,
        }
    }

    fn gps_ms(&self) -> u64 {
        self.start_gps_ms + self.interval.as_millis() as u64 * self.tick as u64
    }

    fn week(&self) -> u32 {
        (self.gps_ms() / WEEK_MS) as u32
    }

    fn tow_ms(&self) -> u32 {
        (self.gps_ms() % WEEK_MS) as u32
    }

    pub fn pvt(&self) -> PvtFix {
        let t = self.tick as f64;
        let (lat, lon, height) = self.origin;
        // Slow wander of a few metres around the origin.
        let lat = lat + 2e-5 * (t * PI / 60.0).sin();
        let lon = lon + 2e-5 * (t * PI / 90.0).cos();
        let height = height + 1.5 * (t * PI / 45.0).sin();
        let tow_ms = self.tow_ms();
        let pdop = 1.4 + 0.2 * (t * PI / 30.0).sin();

        PvtFix {
            week: self.week(),
            tow_ms,
            rx_time: tow_ms as f64 / 1000.0,
            utc_time: String::new(),
            latitude_deg: lat,
            longitude_deg: lon,
            height_m: height,
            position: geodetic_to_ecef(lat, lon, height),
            velocity: Vector3::default(),
            velocity_enu: Enu::default(),
            course_over_ground_deg: 0.0,
            clock_offset_s: 1.0e-4 + 2.0e-9 * t,
            clock_drift_ppm: 0.02,
            valid: true,
            // Single point positioning.
            solution_status: 5,
            solution_type: 0,
            valid_sats: SKY.len() as u32,
            dop: Dop {
                gdop: pdop * 1.2,
                pdop,
                hdop: pdop * 0.6,
                vdop: pdop * 0.8,
            },
            geohash: String::new(),
        }
    }

    pub fn observables(&self) -> ObservablesSnapshot {
        let t = self.tick as f64;
        let tow_ms = self.tow_ms();
        let rx_time = tow_ms as f64 / 1000.0;
        let records = SKY
            .iter()
            .enumerate()
            .map(|(channel, &(system, prn, signal, cn0))| {
                let phase = prn as f64;
                let range = 20_200_000.0 + 150_000.0 * phase + 700.0 * t * (phase / 7.0).sin();
                ObservableRecord {
                    system: system.to_string(),
                    prn,
                    signal: signal.to_string(),
                    channel: channel as u16,
                    tow_ms,
                    pseudorange_m: range,
                    carrier_phase_rads: 2.0 * PI * range * L1_HZ / SPEED_OF_LIGHT,
                    doppler_hz: -3_000.0 * (phase / 7.0).sin(),
                    cn0_dbhz: cn0 + 1.5 * ((t + phase) * PI / 20.0).sin(),
                    tracking: TrackingFlags {
                        acquisition_valid: true,
                        symbol_valid: true,
                        word_valid: true,
                        pseudorange_valid: true,
                        pll_180_locked: true,
                    },
                }
            })
            .collect();
        ObservablesSnapshot::new(rx_time, records)
    }

    pub fn advance(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }
}

fn gps_ms(at: DateTime<Utc>) -> u64 {
    let since = at.timestamp_millis() - GPS_EPOCH_UNIX_MS + LEAP_SECONDS * 1000;
    since.max(0) as u64
}

fn geodetic_to_ecef(lat_deg: f64, lon_deg: f64, height: f64) -> Vector3 {
    let (lat, lon) = (lat_deg.to_radians(), lon_deg.to_radians());
    let n = WGS84_A / (1.0 - WGS84_E2 * lat.sin().powi(2)).sqrt();
    Vector3::new(
        (n + height) * lat.cos() * lon.cos(),
        (n + height) * lat.cos() * lon.sin(),
        (n * (1.0 - WGS84_E2) + height) * lat.sin(),
    )
}

/// Sends one PVT and one observables datagram per interval to `target`
/// (the ports come from the telemetry config). Runs until `count` epochs
/// have been sent, or forever.
pub async fn run(
    config: &TelemetryConfig,
    target: &str,
    interval: Duration,
    count: Option<u64>,
) -> io::Result<()> {
    let interval = interval.max(Duration::from_millis(1));
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let pvt_addr = format!("{}:{}", target, config.pvt_port);
    let obs_addr = format!("{}:{}", target, config.observables_port);
    let mut sim = Simulation::new(config.layout, interval, Utc::now());
    let mut ticker = tokio::time::interval(interval);

    log::info!(
        "Sending synthetic telemetry to {} (pvt) and {} (observables) every {:?}",
        pvt_addr,
        obs_addr,
        interval
    );

    let mut sent = 0u64;
    while count.map_or(true, |n| sent < n) {
        ticker.tick().await;

        let fix = sim.pvt();
        socket.send_to(&encode_pvt(&fix, &sim.layout), &pvt_addr).await?;

        let snapshot = sim.observables();
        socket
            .send_to(&encode_observables(&snapshot, &sim.layout), &obs_addr)
            .await?;
        log::debug!(
            "Epoch {}: {}",
            snapshot.sequence,
            snapshot
                .records
                .iter()
                .map(ObservableRecord::satellite)
                .collect::<Vec<_>>()
                .join(" ")
        );

        sim.advance();
        sent += 1;
    }
    Ok(())
}
