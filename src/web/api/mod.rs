pub mod error;
pub mod gnss;
pub mod health;
pub mod telemetry;
