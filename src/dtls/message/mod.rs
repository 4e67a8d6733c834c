//! Handshake message and extension wire formats

pub mod extension;
pub mod handshake;

pub use extension::{Extension, ExtensionType, UseSrtpExtension};
pub use handshake::{HandshakeHeader, HandshakeMessage, HandshakeType};
