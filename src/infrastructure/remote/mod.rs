pub mod generation;
pub mod http_backend;

pub use generation::GeminiTextGenerator;
pub use http_backend::HttpRemoteBackend;
