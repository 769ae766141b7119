//! Schema of the monitoring datagrams.
//!
//! The receiver publishes each stream as Protocol Buffers, one message per
//! UDP datagram:
//!
//! ```text
//! PVT port          MonitorPvt                       (proto/monitor_pvt.proto)
//! Observables port  Observables { repeated GnssSynchro } (proto/gnss_synchro.proto)
//! ```
//!
//! The message structs below carry the same field numbers and scalar types as
//! the `.proto` files in `proto/`. Fields the relay does not map are still
//! declared so encoded test messages look like the receiver's own.

use serde::Deserialize;

/// Versioned selector for the datagram schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireLayout {
    /// gnss-sdr `MonitorPvt` and `Observables` messages.
    #[default]
    GnssSdrProtobuf,
}

impl WireLayout {
    pub fn name(self) -> &'static str {
        match self {
            WireLayout::GnssSdrProtobuf => "gnss_sdr_protobuf",
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MonitorPvt {
    #[prost(uint32, tag = "1")]
    pub tow_at_current_symbol_ms: u32,
    #[prost(uint32, tag = "2")]
    pub week: u32,
    #[prost(double, tag = "3")]
    pub rx_time: f64,
    #[prost(double, tag = "4")]
    pub user_clk_offset: f64,
    #[prost(double, tag = "5")]
    pub pos_x: f64,
    #[prost(double, tag = "6")]
    pub pos_y: f64,
    #[prost(double, tag = "7")]
    pub pos_z: f64,
    #[prost(double, tag = "8")]
    pub vel_x: f64,
    #[prost(double, tag = "9")]
    pub vel_y: f64,
    #[prost(double, tag = "10")]
    pub vel_z: f64,
    #[prost(double, tag = "11")]
    pub cov_xx: f64,
    #[prost(double, tag = "12")]
    pub cov_yy: f64,
    #[prost(double, tag = "13")]
    pub cov_zz: f64,
    #[prost(double, tag = "14")]
    pub cov_xy: f64,
    #[prost(double, tag = "15")]
    pub cov_yz: f64,
    #[prost(double, tag = "16")]
    pub cov_zx: f64,
    #[prost(double, tag = "17")]
    pub latitude: f64,
    #[prost(double, tag = "18")]
    pub longitude: f64,
    #[prost(double, tag = "19")]
    pub height: f64,
    #[prost(uint32, tag = "20")]
    pub valid_sats: u32,
    #[prost(uint32, tag = "21")]
    pub solution_status: u32,
    #[prost(uint32, tag = "22")]
    pub solution_type: u32,
    #[prost(float, tag = "23")]
    pub ar_ratio_factor: f32,
    #[prost(float, tag = "24")]
    pub ar_ratio_threshold: f32,
    #[prost(double, tag = "25")]
    pub gdop: f64,
    #[prost(double, tag = "26")]
    pub pdop: f64,
    #[prost(double, tag = "27")]
    pub hdop: f64,
    #[prost(double, tag = "28")]
    pub vdop: f64,
    #[prost(double, tag = "29")]
    pub user_clk_drift_ppm: f64,
    #[prost(string, tag = "30")]
    pub utc_time: String,
    #[prost(double, tag = "31")]
    pub vel_e: f64,
    #[prost(double, tag = "32")]
    pub vel_n: f64,
    #[prost(double, tag = "33")]
    pub vel_u: f64,
    #[prost(double, tag = "34")]
    pub cog: f64,
    #[prost(uint32, tag = "35")]
    pub galhas_status: u32,
    #[prost(string, tag = "36")]
    pub geohash: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GnssSynchro {
    #[prost(string, tag = "1")]
    pub system: String,
    #[prost(string, tag = "2")]
    pub signal: String,
    #[prost(uint32, tag = "3")]
    pub prn: u32,
    #[prost(int32, tag = "4")]
    pub channel_id: i32,
    #[prost(double, tag = "5")]
    pub acq_delay_samples: f64,
    #[prost(double, tag = "6")]
    pub acq_doppler_hz: f64,
    #[prost(uint64, tag = "7")]
    pub acq_samplestamp_samples: u64,
    #[prost(uint32, tag = "8")]
    pub acq_doppler_step: u32,
    #[prost(bool, tag = "9")]
    pub flag_valid_acquisition: bool,
    #[prost(int64, tag = "10")]
    pub fs: i64,
    #[prost(double, tag = "11")]
    pub prompt_i: f64,
    #[prost(double, tag = "12")]
    pub prompt_q: f64,
    #[prost(double, tag = "13")]
    pub cn0_db_hz: f64,
    #[prost(double, tag = "14")]
    pub carrier_doppler_hz: f64,
    #[prost(double, tag = "15")]
    pub carrier_phase_rads: f64,
    #[prost(double, tag = "16")]
    pub code_phase_samples: f64,
    #[prost(uint64, tag = "17")]
    pub tracking_sample_counter: u64,
    #[prost(bool, tag = "18")]
    pub flag_valid_symbol_output: bool,
    #[prost(int32, tag = "19")]
    pub correlation_length_ms: i32,
    #[prost(bool, tag = "20")]
    pub flag_valid_word: bool,
    #[prost(uint32, tag = "21")]
    pub tow_at_current_symbol_ms: u32,
    #[prost(double, tag = "22")]
    pub pseudorange_m: f64,
    #[prost(double, tag = "23")]
    pub rx_time: f64,
    #[prost(bool, tag = "24")]
    pub flag_valid_pseudorange: bool,
    #[prost(double, tag = "25")]
    pub interp_tow_ms: f64,
    #[prost(bool, tag = "26")]
    pub flag_pll_180_deg_phase_locked: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Observables {
    #[prost(message, repeated, tag = "1")]
    pub observable: Vec<GnssSynchro>,
}
