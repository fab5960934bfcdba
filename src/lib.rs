pub mod config;
pub mod error;
pub mod firmware;
pub mod logging;
pub mod relay;
pub mod static_files;
pub mod upstream;

pub use config::{Config, UpstreamConfig};
pub use error::RelayError;
pub use relay::RelayServer;
pub use upstream::UpstreamClient;
