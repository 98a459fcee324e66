//! Runtime configuration
//!
//! Configuration is read once at startup from `$VOXELS_PATH/config.toml`,
//! layered over [`WorldConfig::default`], and finally overridden by `VOX_*`
//! environment variables (`terrain.threads` -> `VOX_TERRAIN_THREADS`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::loader::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_FLUSH_DISTANCE, DEFAULT_LOAD_RADIUS,
    FALLBACK_THREAD_COUNT,
};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "VOXELS_PATH";
pub const ENV_OVERRIDE_PREFIX: &str = "VOX_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top level configuration handed to [`crate::World`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub seed: i32,
    pub terrain: TerrainConfig,
    pub cache: CacheConfig,
    pub pools: PoolConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub generator: GeneratorConfig,
    /// <= 0: hardware concurrency; integral: exact count; fractional: share of hardware threads
    pub threads: f32,
    /// Chunks loaded in each direction around the observer
    pub load_radius: u32,
}

/// Terrain generator backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GeneratorConfig {
    Flat,
    Noise {
        #[serde(default = "default_noise_scale")]
        scale: f64,
    },
    #[serde(alias = "python")]
    Socket {
        #[serde(default = "default_socket_address")]
        address: String,
    },
    Native {
        #[serde(default = "default_native_library")]
        library: PathBuf,
    },
}

fn default_noise_scale() -> f64 {
    48.0
}

fn default_socket_address() -> String {
    "tcp:127.0.0.1:17771".to_string()
}

fn default_native_library() -> PathBuf {
    PathBuf::from("libprocgen.so")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum number of chunks retained after leaving the load radius
    pub capacity: usize,
    /// Cached chunks further than this (in chunks) from the centre are freed
    pub flush_distance: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Chunk slots on top of the load area and cache
    pub extra_chunks: usize,
    /// Mesh buffers on top of one per chunk slot plus one spare per loaded chunk
    pub extra_meshes: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            terrain: TerrainConfig::default(),
            cache: CacheConfig::default(),
            pools: PoolConfig::default(),
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::Flat,
            threads: 0.0,
            load_radius: DEFAULT_LOAD_RADIUS,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CACHE_CAPACITY,
            flush_distance: DEFAULT_CACHE_FLUSH_DISTANCE,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            extra_chunks: 0,
            extra_meshes: 0,
        }
    }
}

/// Number of chunks inside a square load area of the given radius
pub fn radius_chunk_count(radius: u32) -> usize {
    let side = 2 * radius as usize + 1;
    side * side
}

impl WorldConfig {
    /// Load from `$VOXELS_PATH/config.toml` (or `./config.toml`), applying env overrides.
    /// A missing file yields the defaults.
    pub fn load() -> ConfigResult<Self> {
        let dir = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| ".".to_string());
        let path = Path::new(&dir).join(CONFIG_FILE_NAME);
        if !path.exists() {
            log::info!(
                "[WorldConfig::load] No configuration at {}, using defaults",
                path.display()
            );
            return Self::from_toml_str_with("", &|key| std::env::var(key).ok());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("[WorldConfig::load] Loaded configuration from {}", path.display());
        Self::from_toml_str_with(&contents, &|key| std::env::var(key).ok())
    }

    /// Parse without consulting the process environment
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Self::from_toml_str_with(contents, &|_| None)
    }

    /// Parse `contents` over the defaults, resolving overrides through `lookup`
    pub fn from_toml_str_with(
        contents: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        let mut merged = toml::Value::try_from(WorldConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        let file: toml::Table = contents
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        merge_values(&mut merged, toml::Value::Table(file));
        apply_env_overrides(&mut merged, "", lookup)?;

        let config: WorldConfig = merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        Ok(config.validated())
    }

    fn validated(mut self) -> Self {
        if self.terrain.load_radius < 1 {
            log::warn!("[WorldConfig] load_radius must be at least 1, clamping");
            self.terrain.load_radius = 1;
        }
        self
    }

    /// Worker thread count derived from `terrain.threads`
    pub fn thread_count(&self) -> usize {
        let hardware = num_cpus::get();
        let requested = self.terrain.threads;

        let count = if requested <= 0.0 {
            hardware
        } else if requested.fract() == 0.0 {
            requested as usize
        } else {
            (requested.min(1.0) * hardware as f32) as usize
        };

        if count == 0 {
            FALLBACK_THREAD_COUNT
        } else {
            count
        }
    }

    pub fn chunk_pool_capacity(&self) -> usize {
        let cache = if self.cache.enabled { self.cache.capacity } else { 0 };
        radius_chunk_count(self.terrain.load_radius) + cache + self.pools.extra_chunks
    }

    /// Every chunk slot owns a mesh; re-meshing a renderable chunk borrows a spare
    pub fn mesh_pool_capacity(&self) -> usize {
        self.chunk_pool_capacity()
            + radius_chunk_count(self.terrain.load_radius)
            + self.pools.extra_meshes
    }
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    // A different generator kind replaces the whole table
                    Some(existing) if key != "generator" => merge_values(existing, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn env_key(path: &str) -> String {
    format!("{}{}", ENV_OVERRIDE_PREFIX, path.replace('.', "_").to_uppercase())
}

fn apply_env_overrides(
    value: &mut toml::Value,
    path: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> ConfigResult<()> {
    if let toml::Value::Table(table) = value {
        for (key, child) in table.iter_mut() {
            let child_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", path, key)
            };
            apply_env_overrides(child, &child_path, lookup)?;
        }
        return Ok(());
    }

    let key = env_key(path);
    let Some(raw) = lookup(&key) else {
        return Ok(());
    };
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: path.to_string(),
        reason: format!("{} ({}={})", reason, key, raw),
    };

    *value = match value {
        toml::Value::Integer(_) => toml::Value::Integer(
            raw.trim().parse().map_err(|_| invalid("expected an integer"))?,
        ),
        toml::Value::Float(_) => toml::Value::Float(
            raw.trim().parse().map_err(|_| invalid("expected a number"))?,
        ),
        toml::Value::Boolean(_) => toml::Value::Boolean(
            raw.trim().parse().map_err(|_| invalid("expected true or false"))?,
        ),
        _ => toml::Value::String(raw.clone()),
    };
    log::debug!("[WorldConfig] {} overridden by {}", path, key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_round_trip_through_empty_file() {
        let config = WorldConfig::from_toml_str("").unwrap();
        assert_eq!(config, WorldConfig::default());
    }

    #[test]
    fn test_file_values_override_defaults() {
        let config = WorldConfig::from_toml_str(
            r#"
            seed = 42

            [terrain]
            load_radius = 3

            [terrain.generator]
            kind = "noise"
            scale = 20.0

            [cache]
            capacity = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, 42);
        assert_eq!(config.terrain.load_radius, 3);
        assert_eq!(config.terrain.generator, GeneratorConfig::Noise { scale: 20.0 });
        assert_eq!(config.cache.capacity, 16);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_python_alias_selects_socket_generator() {
        let config = WorldConfig::from_toml_str(
            r#"
            [terrain.generator]
            kind = "python"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.terrain.generator,
            GeneratorConfig::Socket { address: default_socket_address() }
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VOX_TERRAIN_THREADS", "3"),
            ("VOX_CACHE_ENABLED", "false"),
            ("VOX_SEED", "-7"),
        ]
        .into_iter()
        .collect();

        let config =
            WorldConfig::from_toml_str_with("", &|key| env.get(key).map(|v| v.to_string()))
                .unwrap();
        assert_eq!(config.terrain.threads, 3.0);
        assert!(!config.cache.enabled);
        assert_eq!(config.seed, -7);
        assert_eq!(config.thread_count(), 3);
    }

    #[test]
    fn test_bad_env_override_is_reported() {
        let result = WorldConfig::from_toml_str_with("", &|key| {
            (key == "VOX_TERRAIN_LOAD_RADIUS").then(|| "far".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_radius_is_clamped() {
        let config = WorldConfig::from_toml_str("[terrain]\nload_radius = 0\n").unwrap();
        assert_eq!(config.terrain.load_radius, 1);
    }

    #[test]
    fn test_thread_count_rules() {
        let hardware = num_cpus::get();
        let mut config = WorldConfig::default();

        config.terrain.threads = 0.0;
        assert_eq!(config.thread_count(), hardware);

        config.terrain.threads = 5.0;
        assert_eq!(config.thread_count(), 5);

        config.terrain.threads = 0.5;
        let expected = (0.5 * hardware as f32) as usize;
        assert_eq!(config.thread_count(), if expected == 0 { FALLBACK_THREAD_COUNT } else { expected });
    }

    #[test]
    fn test_pool_capacities_follow_radius_and_cache() {
        let mut config = WorldConfig::default();
        config.terrain.load_radius = 2;
        config.cache.capacity = 10;
        assert_eq!(config.chunk_pool_capacity(), 25 + 10);
        assert_eq!(config.mesh_pool_capacity(), 35 + 25);

        config.cache.enabled = false;
        assert_eq!(config.chunk_pool_capacity(), 25);
    }
}
