//! Service wiring for the viability workflow engine: configuration, the
//! inbound webhook, the completion notifier and the artifact uploader. The
//! interesting machinery lives in the workspace crates; this layer only
//! connects it to the outside world.

pub mod config;
pub mod server;
pub mod upload;

pub use config::AppConfig;
pub use server::notify::Notifier;
pub use server::AppState;
pub use upload::S3ArtifactStore;
