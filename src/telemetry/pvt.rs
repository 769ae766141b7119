use prost::Message;

use super::error::{DecodeError, MessageKind};
use super::layout::{MonitorPvt, WireLayout};
use super::types::{Dop, Enu, PvtFix, Vector3};

/// `solution_status` reported when the receiver has no solution.
const STATUS_NONE: u32 = 0;

pub fn decode_pvt(buf: &[u8], layout: &WireLayout) -> Result<PvtFix, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::Empty(MessageKind::Pvt));
    }
    let msg = match layout {
        WireLayout::GnssSdrProtobuf => {
            MonitorPvt::decode(buf).map_err(|source| DecodeError::Malformed {
                kind: MessageKind::Pvt,
                source,
            })?
        }
    };

    let invalid = |field| DecodeError::InvalidField {
        kind: MessageKind::Pvt,
        field,
    };
    if !(-90.0..=90.0).contains(&msg.latitude) {
        return Err(invalid("latitude"));
    }
    if !(-180.0..=180.0).contains(&msg.longitude) {
        return Err(invalid("longitude"));
    }
    if !msg.rx_time.is_finite() {
        return Err(invalid("rx_time"));
    }

    Ok(PvtFix {
        week: msg.week,
        tow_ms: msg.tow_at_current_symbol_ms,
        rx_time: msg.rx_time,
        utc_time: msg.utc_time,
        latitude_deg: msg.latitude,
        longitude_deg: msg.longitude,
        height_m: msg.height,
        position: Vector3::new(msg.pos_x, msg.pos_y, msg.pos_z),
        velocity: Vector3::new(msg.vel_x, msg.vel_y, msg.vel_z),
        velocity_enu: Enu {
            east: msg.vel_e,
            north: msg.vel_n,
            up: msg.vel_u,
        },
        course_over_ground_deg: msg.cog,
        clock_offset_s: msg.user_clk_offset,
        clock_drift_ppm: msg.user_clk_drift_ppm,
        valid: msg.solution_status != STATUS_NONE,
        solution_status: msg.solution_status,
        solution_type: msg.solution_type,
        valid_sats: msg.valid_sats,
        dop: Dop {
            gdop: msg.gdop,
            pdop: msg.pdop,
            hdop: msg.hdop,
            vdop: msg.vdop,
        },
        geohash: msg.geohash,
    })
}

/// Builds the message the receiver would send for `fix`. `valid` is not
/// encoded; it follows from `solution_status`.
pub fn encode_pvt(fix: &PvtFix, layout: &WireLayout) -> Vec<u8> {
    match layout {
        WireLayout::GnssSdrProtobuf => MonitorPvt {
            tow_at_current_symbol_ms: fix.tow_ms,
            week: fix.week,
            rx_time: fix.rx_time,
            user_clk_offset: fix.clock_offset_s,
            pos_x: fix.position.x,
            pos_y: fix.position.y,
            pos_z: fix.position.z,
            vel_x: fix.velocity.x,
            vel_y: fix.velocity.y,
            vel_z: fix.velocity.z,
            latitude: fix.latitude_deg,
            longitude: fix.longitude_deg,
            height: fix.height_m,
            valid_sats: fix.valid_sats,
            solution_status: fix.solution_status,
            solution_type: fix.solution_type,
            gdop: fix.dop.gdop,
            pdop: fix.dop.pdop,
            hdop: fix.dop.hdop,
            vdop: fix.dop.vdop,
            user_clk_drift_ppm: fix.clock_drift_ppm,
            utc_time: fix.utc_time.clone(),
            vel_e: fix.velocity_enu.east,
            vel_n: fix.velocity_enu.north,
            vel_u: fix.velocity_enu.up,
            cog: fix.course_over_ground_deg,
            geohash: fix.geohash.clone(),
            ..MonitorPvt::default()
        }
        .encode_to_vec(),
    }
}
