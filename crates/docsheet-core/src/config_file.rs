use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Config, SchemaPolicy};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub service: Option<ServiceConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub report: Option<ReportConfig>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub canvas_id: Option<String>,
    pub base_url: Option<String>,
    pub records_field: Option<String>,
    pub text_variable: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub schema_errors: Option<SchemaPolicy>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("canvas_id", &self.canvas_id)
            .field("base_url", &self.base_url)
            .field("records_field", &self.records_field)
            .field("text_variable", &self.text_variable)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("schema_errors", &self.schema_errors)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub num_workers: Option<usize>,
    pub structuring_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_path: Option<String>,
    pub sheet_name: Option<String>,
    pub summary_sheet: Option<bool>,
}

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Platform config directory path: `<config_dir>/docsheet/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("docsheet").join("config.toml"))
}

/// Load config by cascading CWD `.docsheet.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".docsheet.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Load a config the user pointed at explicitly. Unlike [`load_from_path`],
/// a missing or malformed file is an error.
pub fn load_explicit(path: &Path) -> Result<ConfigFile, ConfigFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn pick<T: Clone, S>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (bs, os) = (&base.service, &overlay.service);
    let (bc, oc) = (&base.concurrency, &overlay.concurrency);
    let (br, or) = (&base.report, &overlay.report);

    ConfigFile {
        service: Some(ServiceConfig {
            api_key: pick(os, bs, |s| s.api_key.clone()),
            canvas_id: pick(os, bs, |s| s.canvas_id.clone()),
            base_url: pick(os, bs, |s| s.base_url.clone()),
            records_field: pick(os, bs, |s| s.records_field.clone()),
            text_variable: pick(os, bs, |s| s.text_variable.clone()),
            request_timeout_secs: pick(os, bs, |s| s.request_timeout_secs),
            schema_errors: pick(os, bs, |s| s.schema_errors),
        }),
        concurrency: Some(ConcurrencyConfig {
            num_workers: pick(oc, bc, |c| c.num_workers),
            structuring_concurrency: pick(oc, bc, |c| c.structuring_concurrency),
        }),
        report: Some(ReportConfig {
            output_path: pick(or, br, |r| r.output_path.clone()),
            sheet_name: pick(or, br, |r| r.sheet_name.clone()),
            summary_sheet: pick(or, br, |r| r.summary_sheet),
        }),
    }
}

impl ConfigFile {
    /// Overlay the file's values on `config`. Fields the file leaves unset
    /// keep their current value.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref s) = self.service {
            if let Some(ref v) = s.api_key {
                config.api_key = Some(v.clone());
            }
            if let Some(ref v) = s.canvas_id {
                config.canvas_id = Some(v.clone());
            }
            if let Some(ref v) = s.base_url {
                config.base_url = v.clone();
            }
            if let Some(ref v) = s.records_field {
                config.records_field = v.clone();
            }
            if let Some(ref v) = s.text_variable {
                config.text_variable = v.clone();
            }
            if let Some(v) = s.request_timeout_secs {
                config.request_timeout_secs = v;
            }
            if let Some(v) = s.schema_errors {
                config.schema_policy = v;
            }
        }
        if let Some(ref c) = self.concurrency {
            if let Some(v) = c.num_workers {
                config.num_workers = v.max(1);
            }
            if let Some(v) = c.structuring_concurrency {
                config.structuring_concurrency = v.max(1);
            }
        }
    }
}
