pub mod btle;
pub mod constants;
pub mod session;
pub mod state;
pub mod transport;
pub mod types;
