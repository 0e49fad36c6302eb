mod codec;
pub mod condition;
pub mod config;
pub mod controller;
mod middleware;
mod node;
pub mod server;

pub use config::{read_config, Credentials, DavConfig};
pub use controller::DavState;
pub use server::Server;
