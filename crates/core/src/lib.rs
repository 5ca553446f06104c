pub mod config;
pub mod gatekeeper;
pub mod message;
pub mod mime;
pub mod observer;
pub mod recipients;
pub mod registry;
pub mod transport;
pub mod transports;
pub mod whitelist;

pub use config::*;
pub use gatekeeper::*;
pub use message::*;
pub use mime::*;
pub use observer::*;
pub use recipients::*;
pub use registry::*;
pub use transport::*;
pub use transports::*;
pub use whitelist::*;
