pub mod catalog;
pub mod color;
pub mod config;
pub mod discovery;
pub mod error;
pub mod html;
pub mod http;
pub mod registry;
pub mod tabular;
pub mod template;
pub mod verify;

pub use error::{DiscoveryError, RegistryError, TransportError};
