//! Classifier configuration. Every setting has a default, so the server runs
//! with no config file and no environment at all: it then listens on
//! `0.0.0.0:5000` and loads `models/mobilenet_v2.pt`.

use crate::preprocess::{Layout, Preprocessing};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Config file read when no path is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "classify.toml";

/// Prefix of environment overrides, e.g. `CLASSIFY_SERVER__PORT=8080`
pub const ENV_PREFIX: &str = "CLASSIFY";

/// Default tracing filter, used when `RUST_LOG` is not set
pub const RUST_LOG: &str = "info,actix_web=info";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MODEL: &str = "models/mobilenet_v2.pt";

/// Side length of the square image the model is fed
pub const IMAGE_SIZE: u32 = 224;

/// Number of predictions returned per request
pub const TOP_N: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tracing filter directive
    pub log: String,
    pub server: ServerSettings,
    pub model: ModelSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,

    /// Reject `file` uploads larger than this. Unset means uploads are
    /// trusted and read in full.
    pub max_upload_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Path to the TorchScript model file
    pub path: PathBuf,

    /// Keras-style `imagenet_class_index.json`. The built-in ImageNet
    /// descriptions are used when unset.
    pub labels: Option<PathBuf>,

    pub preprocessing: Preprocessing,
    pub layout: Layout,

    /// Apply softmax to the raw model output (for models emitting logits)
    pub softmax: bool,

    /// Run on CUDA when a device is available
    pub cuda: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log: RUST_LOG.into(),
            server: ServerSettings::default(),
            model: ModelSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            max_upload_bytes: None,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            path: DEFAULT_MODEL.into(),
            labels: None,
            preprocessing: Preprocessing::Torch,
            layout: Layout::Nchw,
            softmax: true,
            cuda: false,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply `CLASSIFY_*`
    /// environment overrides on top
    pub fn load(file: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::new(file, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("invalid configuration in {file} or {ENV_PREFIX}_* environment"))
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}
