mod error;
mod process;
mod supervisor;
mod types;

pub use supervisor::Supervisor;
pub use types::{ControlResult, ExitDetail, ProcessState, ProcessStatus};
