use prost::Message;

use super::error::{DecodeError, MessageKind};
use super::layout::{GnssSynchro, Observables, WireLayout};
use super::types::{ObservableRecord, ObservablesSnapshot, TrackingFlags};

/// More channels than any receiver configuration runs.
pub const MAX_RECORDS: usize = 512;

/// The snapshot time is taken from the first record; the receiver stamps
/// every record of an epoch with the same `rx_time`.
pub fn decode_observables(
    buf: &[u8],
    layout: &WireLayout,
) -> Result<ObservablesSnapshot, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::Empty(MessageKind::Observables));
    }
    let msg = match layout {
        WireLayout::GnssSdrProtobuf => {
            Observables::decode(buf).map_err(|source| DecodeError::Malformed {
                kind: MessageKind::Observables,
                source,
            })?
        }
    };

    if msg.observable.len() > MAX_RECORDS {
        return Err(DecodeError::TooManyRecords(msg.observable.len()));
    }
    let Some(first) = msg.observable.first() else {
        return Err(DecodeError::NoRecords);
    };
    let rx_time = first.rx_time;
    if !rx_time.is_finite() || rx_time < 0.0 {
        return Err(DecodeError::InvalidRecord {
            index: 0,
            field: "rx_time",
        });
    }

    let records = msg
        .observable
        .into_iter()
        .enumerate()
        .map(|(index, synchro)| decode_record(index, synchro))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ObservablesSnapshot::new(rx_time, records))
}

fn decode_record(index: usize, s: GnssSynchro) -> Result<ObservableRecord, DecodeError> {
    let invalid = |field| DecodeError::InvalidRecord { index, field };

    let mut system = s.system.chars();
    match (system.next(), system.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => {}
        _ => return Err(invalid("system")),
    }
    if s.signal.len() != 2 || !s.signal.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(invalid("signal"));
    }
    let prn = u8::try_from(s.prn).map_err(|_| invalid("prn"))?;
    let channel = u16::try_from(s.channel_id).map_err(|_| invalid("channel_id"))?;

    Ok(ObservableRecord {
        system: s.system,
        prn,
        signal: s.signal,
        channel,
        tow_ms: s.tow_at_current_symbol_ms,
        pseudorange_m: s.pseudorange_m,
        carrier_phase_rads: s.carrier_phase_rads,
        doppler_hz: s.carrier_doppler_hz,
        cn0_dbhz: s.cn0_db_hz,
        tracking: TrackingFlags {
            acquisition_valid: s.flag_valid_acquisition,
            symbol_valid: s.flag_valid_symbol_output,
            word_valid: s.flag_valid_word,
            pseudorange_valid: s.flag_valid_pseudorange,
            pll_180_locked: s.flag_pll_180_deg_phase_locked,
        },
    })
}

/// Encodes a snapshot the way the receiver does, stamping every record with
/// the snapshot's `rx_time`. At most [`MAX_RECORDS`] records are written;
/// `sequence` and `satellite_count` are recomputed by the decoder.
pub fn encode_observables(snapshot: &ObservablesSnapshot, layout: &WireLayout) -> Vec<u8> {
    let records = &snapshot.records[..snapshot.records.len().min(MAX_RECORDS)];
    match layout {
        WireLayout::GnssSdrProtobuf => Observables {
            observable: records
                .iter()
                .map(|rec| GnssSynchro {
                    system: rec.system.clone(),
                    signal: rec.signal.clone(),
                    prn: rec.prn.into(),
                    channel_id: rec.channel.into(),
                    flag_valid_acquisition: rec.tracking.acquisition_valid,
                    cn0_db_hz: rec.cn0_dbhz,
                    carrier_doppler_hz: rec.doppler_hz,
                    carrier_phase_rads: rec.carrier_phase_rads,
                    flag_valid_symbol_output: rec.tracking.symbol_valid,
                    flag_valid_word: rec.tracking.word_valid,
                    tow_at_current_symbol_ms: rec.tow_ms,
                    pseudorange_m: rec.pseudorange_m,
                    rx_time: snapshot.rx_time,
                    flag_valid_pseudorange: rec.tracking.pseudorange_valid,
                    flag_pll_180_deg_phase_locked: rec.tracking.pll_180_locked,
                    ..GnssSynchro::default()
                })
                .collect(),
        }
        .encode_to_vec(),
    }
}
