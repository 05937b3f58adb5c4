pub mod qr_encoder;
pub mod remote_backend;
pub mod text_generator;

pub use qr_encoder::QrImageEncoder;
pub use remote_backend::{RemoteBackend, RemoteError};
pub use text_generator::{GenerationOptions, TextGenerator};
