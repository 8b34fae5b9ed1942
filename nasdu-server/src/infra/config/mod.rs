pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    Config, ConfigLoad, ConfigMetadata, ConfigWarning, ConfigWarnings,
    MountConfig, ServerConfig, StorageConfig,
};
pub use validation::ScanEntryError;
