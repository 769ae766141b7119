//! Decoding of the receiver's monitoring datagrams.
//!
//! Pure functions only: bytes in, records out. The schema is selected by
//! [`WireLayout`]; today that is the receiver's Protocol Buffers messages.

mod error;
mod layout;
mod observables;
mod pvt;
mod types;

pub use error::DecodeError;
pub use layout::WireLayout;
pub use observables::{decode_observables, encode_observables};
pub use pvt::{decode_pvt, encode_pvt};
pub use types::{Dop, Enu, ObservableRecord, ObservablesSnapshot, PvtFix, TrackingFlags, Vector3};
