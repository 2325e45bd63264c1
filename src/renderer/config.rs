use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use glam::Vec4;
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::IntoDeserializer;
use serde::Deserialize;

/// Settings file read from the working directory. Every key is optional.
pub const CONFIG_PATH: &str = "trigon.toml";

/// Everything loaded at startup.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub window: AppConfig,
    pub renderer: RenderConfig,
}

impl Config {
    /// Reads `trigon.toml` if present, then applies `TRIGON_*` environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(CONFIG_PATH)?;
        config.renderer.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file {:?}", path))?;
        let config = Self::from_toml(&content)
            .wrap_err_with(|| format!("Failed to parse config file {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Vulkan,
    /// Advances frames without touching a GPU
    Headless,
}

impl FromStr for Backend {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let deserializer: StrDeserializer<'_, ValueError> = s.into_deserializer();
        Self::deserialize(deserializer)
    }
}

/// Which adapter the caller would like, if it qualifies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GpuPreference {
    /// Substring matched against the adapter name
    pub device_name: Option<String>,
    /// Position in the driver's enumeration order
    pub index: Option<usize>,
}

/// Contains configuration options for the renderer
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub backend: Backend,
    pub gpu: GpuPreference,
    pub enable_validation: bool,
    pub clear_color: Vec4,
    /// Unset waits on frame fences forever
    pub fence_timeout_ms: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            gpu: GpuPreference::default(),
            enable_validation: cfg!(debug_assertions),
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            fence_timeout_ms: None,
        }
    }
}

impl RenderConfig {
    pub const BACKEND_VAR: &'static str = "TRIGON_BACKEND";
    pub const GPU_VAR: &'static str = "TRIGON_GPU";
    pub const GPU_INDEX_VAR: &'static str = "TRIGON_GPU_INDEX";
    pub const VALIDATION_VAR: &'static str = "TRIGON_VALIDATION";
    pub const FENCE_TIMEOUT_VAR: &'static str = "TRIGON_FENCE_TIMEOUT_MS";

    /// Overrides file settings with whatever `lookup` reports for the `TRIGON_*` keys.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(backend) = parse_override(&lookup, Self::BACKEND_VAR)? {
            self.backend = backend;
        }
        if let Some(name) = lookup(Self::GPU_VAR) {
            self.gpu.device_name = Some(name);
        }
        if let Some(index) = parse_override(&lookup, Self::GPU_INDEX_VAR)? {
            self.gpu.index = Some(index);
        }
        if let Some(validation) = parse_override(&lookup, Self::VALIDATION_VAR)? {
            self.enable_validation = validation;
        }
        if let Some(timeout) = parse_override(&lookup, Self::FENCE_TIMEOUT_VAR)? {
            self.fence_timeout_ms = Some(timeout);
        }

        // An empty name matches every adapter, so treat it as no preference
        self.gpu.device_name = self
            .gpu
            .device_name
            .take()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());

        Ok(())
    }

    pub fn clear_color_array(&self) -> [f32; 4] {
        self.clear_color.to_array()
    }

    pub fn fence_timeout(&self) -> Option<Duration> {
        self.fence_timeout_ms.map(Duration::from_millis)
    }

    /// Fence wait timeout in nanoseconds as Vulkan expects it.
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout()
            .map_or(u64::MAX, |timeout| u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX))
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .wrap_err_with(|| format!("Invalid {} {:?}", key, value))
        })
        .transpose()
}

/// Window and event loop settings of the application facade.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Engine".to_string(),
            width: 1024,
            height: 640,
            resizable: true,
        }
    }
}
