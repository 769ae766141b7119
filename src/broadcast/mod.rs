mod broadcaster;
mod protocol;
pub mod session;

pub use broadcaster::Broadcaster;
