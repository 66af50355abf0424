use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::foundation::error::{ForgeError, ForgeResult};

pub(crate) const DEFAULT_QUALITY: u8 = 90;
pub(crate) const DEFAULT_COMPRESSION_LEVEL: u8 = 6;
pub(crate) const DEFAULT_BATCH_SIZE: u64 = 100;
pub(crate) const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 5;
pub(crate) const DEFAULT_CONCURRENT_UPLOADS: usize = 3;
pub(crate) const DEFAULT_CHECKPOINT_INTERVAL: u64 = 10;
pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Drive rejects resumable chunks that are not a multiple of 256 KiB (except the last one).
const CHUNK_ALIGN: u64 = 256 * 1024;

const ENV_CLIENT_ID: &str = "LAYERFORGE_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "LAYERFORGE_CLIENT_SECRET";
const ENV_REFRESH_TOKEN: &str = "LAYERFORGE_REFRESH_TOKEN";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
/// Output raster encoding.
pub enum ImageFormat {
    /// Lossless PNG; tuned by `compressionLevel` (0-9).
    #[default]
    Png,
    /// Lossy JPEG; tuned by `quality` (1-100). Alpha is flattened over white.
    Jpeg,
    /// Lossy AVIF; tuned by `quality` (1-100).
    Avif,
}

impl ImageFormat {
    /// File extension (without the dot) used for rendered outputs.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Avif => "avif",
        }
    }

    /// MIME type declared when uploading a file with this format.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Avif => "image/avif",
        }
    }

    /// Map a file extension back to a format, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Remote storage settings for the transfer stage.
pub struct RemoteConfig {
    /// Name of the root container that receives one sub-container per batch.
    pub root_folder_name: String,
    /// Optional parent container id for the root container.
    pub parent_folder_id: Option<String>,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Long-lived OAuth refresh token.
    pub refresh_token: String,
    /// Override for the metadata API base URL.
    pub api_base: Option<String>,
    /// Override for the upload API base URL.
    pub upload_base: Option<String>,
    /// Override for the OAuth token endpoint.
    pub token_url: Option<String>,
}

impl RemoteConfig {
    /// Fill empty credentials from `LAYERFORGE_*` environment variables.
    pub fn with_env_secrets(mut self) -> Self {
        fill_from_env(&mut self.client_id, ENV_CLIENT_ID);
        fill_from_env(&mut self.client_secret, ENV_CLIENT_SECRET);
        fill_from_env(&mut self.refresh_token, ENV_REFRESH_TOKEN);
        self
    }

    /// Ensure every credential needed for a token exchange is present.
    pub fn validate(&self) -> ForgeResult<()> {
        if self.root_folder_name.trim().is_empty() {
            return Err(ForgeError::validation(
                "remote.rootFolderName must be non-empty",
            ));
        }
        for (name, value) in [
            ("clientId", &self.client_id),
            ("clientSecret", &self.client_secret),
            ("refreshToken", &self.refresh_token),
        ] {
            if value.is_empty() {
                return Err(ForgeError::validation(format!(
                    "remote.{name} is required (set it in the config or the environment)"
                )));
            }
        }
        Ok(())
    }
}

fn fill_from_env(slot: &mut String, var: &str) {
    if slot.is_empty()
        && let Ok(v) = std::env::var(var)
    {
        *slot = v;
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Complete pipeline configuration.
///
/// Every field has a default, so a config file only needs the values it changes. Zero values
/// mean "use the default"; call [`PipelineConfig::normalized`] before running a stage.
pub struct PipelineConfig {
    /// Directory holding batch folders and both checkpoint files.
    pub output_root: PathBuf,
    /// Directory holding `<layer>/<value>.png` source images.
    pub layers_dir: PathBuf,
    /// Layer names, bottom to top. Empty means "use each item's own order".
    pub layer_order: Vec<String>,
    /// Composition workers; `0` selects host concurrency minus one.
    pub num_workers: usize,
    /// Output raster encoding.
    pub image_format: ImageFormat,
    /// JPEG/AVIF quality, 1-100.
    pub quality: u8,
    /// PNG compression level, 0-9.
    pub compression_level: u8,
    /// Items per batch directory.
    pub batch_size: u64,
    /// Upload chunk size in bytes.
    pub chunk_size: u64,
    /// Retries per remote call before the failure becomes terminal.
    pub max_retries: u32,
    /// Simultaneous file uploads per window.
    pub concurrent_uploads: usize,
    /// Remove local files once they are recorded as uploaded.
    pub delete_local_after_upload: bool,
    /// Ignore any generation checkpoint and render from index 1.
    pub force_regenerate: bool,
    /// Progress events between generation checkpoint writes.
    pub checkpoint_interval: u64,
    /// Bounded capacity of the worker event channel, per worker.
    pub channel_capacity: usize,
    /// Remote settings; required only for the transfer stage.
    pub remote: Option<RemoteConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("build"),
            layers_dir: PathBuf::from("layers"),
            layer_order: Vec::new(),
            num_workers: 0,
            image_format: ImageFormat::Png,
            quality: DEFAULT_QUALITY,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            concurrent_uploads: DEFAULT_CONCURRENT_UPLOADS,
            delete_local_after_upload: false,
            force_regenerate: false,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            remote: None,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file. Relative paths inside it resolve against the file's directory.
    pub fn from_path(path: &Path) -> ForgeResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let mut cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config '{}'", path.display()))?;

        if let Some(base) = path.parent() {
            cfg.output_root = rebase(base, &cfg.output_root);
            cfg.layers_dir = rebase(base, &cfg.layers_dir);
        }
        cfg.remote = cfg.remote.map(RemoteConfig::with_env_secrets);
        Ok(cfg)
    }

    /// Return a copy with absent or zero values replaced by safe defaults.
    ///
    /// `num_workers == 0` is kept as-is; it is resolved against the host at run time.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        if out.quality == 0 {
            out.quality = DEFAULT_QUALITY;
        }
        out.quality = out.quality.min(100);
        out.compression_level = out.compression_level.min(9);
        if out.batch_size == 0 {
            out.batch_size = DEFAULT_BATCH_SIZE;
        }
        if out.chunk_size == 0 {
            out.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        out.chunk_size = out.chunk_size.div_ceil(CHUNK_ALIGN) * CHUNK_ALIGN;
        if out.max_retries == 0 {
            out.max_retries = DEFAULT_MAX_RETRIES;
        }
        if out.concurrent_uploads == 0 {
            out.concurrent_uploads = DEFAULT_CONCURRENT_UPLOADS;
        }
        if out.checkpoint_interval == 0 {
            out.checkpoint_interval = DEFAULT_CHECKPOINT_INTERVAL;
        }
        if out.channel_capacity == 0 {
            out.channel_capacity = DEFAULT_CHANNEL_CAPACITY;
        }
        out
    }
}

fn rebase(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() || base.as_os_str().is_empty() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
