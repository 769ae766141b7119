pub mod api;
pub mod api_doc;
pub mod server;
mod state;
mod ws;

pub use server::run_server;
pub use state::AppState;
