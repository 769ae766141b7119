use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Pvt,
    Observables,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Pvt => write!(f, "pvt"),
            MessageKind::Observables => write!(f, "observables"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty {0} datagram")]
    Empty(MessageKind),
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: MessageKind,
        #[source]
        source: prost::DecodeError,
    },
    #[error("observables message carries no records")]
    NoRecords,
    #[error("record count {0} exceeds the per-snapshot limit")]
    TooManyRecords(usize),
    #[error("{kind} field {field} out of range")]
    InvalidField {
        kind: MessageKind,
        field: &'static str,
    },
    #[error("record {index}: invalid {field}")]
    InvalidRecord { index: usize, field: &'static str },
}
