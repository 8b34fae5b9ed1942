use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};
use thiserror::Error;

use super::{
    models::{
        Config, ConfigLoad, ConfigMetadata, ConfigWarnings, DEFAULT_HISTORY_PATH,
        DEFAULT_HOST, DEFAULT_PORT, MountConfig, ServerConfig, StorageConfig,
    },
    sources::{EnvConfig, FileConfig},
    validation::{ScanEntryError, build_definitions},
};

static DEFAULT_CONFIG_LOCATIONS: LazyLock<Vec<PathBuf>> = LazyLock::new(|| {
    vec![
        PathBuf::from("nasdu.toml"),
        PathBuf::from("config/nasdu.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Skip reading `NASDU_*` variables. Used by tests.
    pub ignore_env: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn ignore_env(mut self) -> Self {
        self.options.ignore_env = true;
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = if self.options.ignore_env {
            false
        } else {
            match &self.options.env_file {
                Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                    |err| match err {
                        dotenvy::Error::Io(_) => Ok(false),
                        _ => Err(err),
                    },
                )?,
                None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?,
            }
        };

        let env_config = if self.options.ignore_env {
            EnvConfig::default()
        } else {
            EnvConfig::gather()
        };

        let (file_config, config_path) = self.load_file_config(&env_config)?;

        let (config, warnings) =
            self.compose_config(file_config, env_config, config_path, env_file_loaded)?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
        env_file_loaded: bool,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if config_path.is_none() {
            warnings.push_with_hint(
                "No nasdu.toml detected; running without configured scans",
                "Create nasdu.toml or pass --config to define [[scans]]",
            );
        }

        let FileConfig {
            server: file_server,
            storage: file_storage,
            mount: file_mount,
            runner,
            progress,
            scans,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
        };

        let storage = StorageConfig {
            history_path: env
                .history_path
                .or(file_storage.history_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH)),
        };

        let mount = MountConfig {
            root: env.mount_root.or(file_mount.root),
        };
        if let Some(root) = &mount.root
            && !root.is_dir()
        {
            warnings.push(format!(
                "mount root {} is not a directory; scans will fail until it exists",
                root.display()
            ));
        }

        let runner = runner.unwrap_or_default();
        if runner.max_parallel_paths != runner.parallel_limit() {
            warnings.push(format!(
                "runner.max_parallel_paths = {} is out of range; using {}",
                runner.max_parallel_paths,
                runner.parallel_limit()
            ));
        }

        let scans = build_definitions(scans, &mut warnings)?;
        if scans.is_empty() && config_path.is_some() {
            warnings.push("configuration defines no [[scans]]");
        }

        let config = Config {
            server,
            storage,
            mount,
            runner,
            progress: progress.unwrap_or_default(),
            scans,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        };

        Ok((config, warnings))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source: err,
    })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid scan definition: {0}")]
    Scan(#[from] ScanEntryError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}
