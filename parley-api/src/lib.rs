pub mod auth;
pub mod handlers;
pub mod server;
pub mod state;
pub mod websocket;

pub use server::run;
pub use state::ApiState;
