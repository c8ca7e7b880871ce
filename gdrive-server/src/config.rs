//! Flat key/value configuration.
//!
//! Keys are dotted (`upload.part_threshold`). Environment variables with the
//! `GDRIVE__` prefix override them, double underscores becoming dots:
//!
//! ```bash
//! export GDRIVE__UPLOAD__PART_THRESHOLD=10485760
//! export GDRIVE__STORAGE__KIND=fs
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use gdrive_blob::{S3Settings, UploadConfig};

pub const ENV_PREFIX: &str = "GDRIVE__";

#[derive(Debug, Default, Clone)]
pub struct ConfigMap {
    values: HashMap<String, String>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every `GDRIVE__*` variable of the process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars(), ENV_PREFIX)
    }

    pub fn from_vars<I>(vars: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = Self::new();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                // GDRIVE__UPLOAD__PART_THRESHOLD -> upload.part_threshold
                config.set(stripped.to_lowercase().replace("__", "."), value);
            }
        }
        config
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Parse a key, failing loudly on a malformed value
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| anyhow!("invalid value {:?} for {}: {}", raw, key, e))
            })
            .transpose()
    }
}

/// Which backend uploads are written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Fs,
    Memory,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageKind::S3),
            "fs" | "local" => Ok(StorageKind::Fs),
            "memory" | "mem" => Ok(StorageKind::Memory),
            other => Err(format!("unknown storage kind `{}` (expected s3, fs or memory)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub kind: StorageKind,
    pub root: PathBuf,
    pub s3: S3Settings,
}

/// Everything the server needs to start
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub storage: StorageSettings,
    pub upload: UploadConfig,
}

impl ServerSettings {
    pub fn from_config(config: &ConfigMap) -> Result<Self> {
        let mut upload = UploadConfig::default();
        if let Some(bucket) = config.get("storage.bucket") {
            upload = upload.with_bucket(bucket);
        }
        if let Some(threshold) = config.parse::<usize>("upload.part_threshold")? {
            upload = upload.with_part_threshold(threshold);
        }
        if let Some(ms) = config.parse::<u64>("upload.progress_interval_ms")? {
            upload = upload.with_progress_interval(Duration::from_millis(ms));
        }
        if let Some(prefix) = config.get("upload.key_prefix") {
            upload = upload.with_key_prefix(prefix);
        }
        if let Some(abort) = config.parse::<bool>("upload.abort_on_failure")? {
            upload.abort_on_failure = abort;
        }
        if let Some(allow) = config.parse::<bool>("upload.allow_empty")? {
            upload.allow_empty = allow;
        }
        upload.validate().context("invalid upload configuration")?;

        let storage = StorageSettings {
            kind: config
                .parse::<StorageKind>("storage.kind")?
                .unwrap_or(StorageKind::Memory),
            root: PathBuf::from(config.get_or("storage.root", "uploads")),
            s3: S3Settings {
                region: config.get("storage.region").map(str::to_string),
                endpoint_url: config.get("storage.endpoint").map(str::to_string),
                access_key_id: config.get("storage.access_key_id").map(str::to_string),
                secret_access_key: config.get("storage.secret_access_key").map(str::to_string),
            },
        };

        Ok(Self {
            host: config.get_or("http.host", "127.0.0.1"),
            port: config.parse::<u16>("http.port")?.unwrap_or(3000),
            storage,
            upload,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
