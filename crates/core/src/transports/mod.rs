//! Built-in [`Transport`](crate::Transport) implementations.
//!
//! Contains [`TestTransport`] for in-memory capture, [`FileTransport`]
//! for writing `.eml` files to disk and [`SmtpTransport`] for relaying
//! through an SMTP server.

pub mod capture;
pub mod file;
pub mod smtp;

pub use capture::*;
pub use file::*;
pub use smtp::*;
