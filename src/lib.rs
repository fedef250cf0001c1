pub mod auth;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod multicast;
pub mod output;
pub mod subscription;
pub mod transport;
pub mod wire;
pub mod supervisor;

pub use error::ClientError;
pub use identity::NodeIdentity;
pub use supervisor::Supervisor;
