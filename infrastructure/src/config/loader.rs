//! Configuration loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::PathBuf;

/// Loads and merges configuration from files and the environment.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. `TERRA_*` environment variables (`TERRA_ENGINE__MAX_WORKERS=4`)
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./terra.toml` or `./.terra.toml`
    /// 4. Global: `~/.config/terra-engine/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, Box<figment::Error>> {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(&global_path));
            }
        }

        for filename in &["terra.toml", ".terra.toml"] {
            let path = PathBuf::from(filename);
            if path.exists() {
                figment = figment.merge(Toml::file(&path));
                break;
            }
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("TERRA_").split("__"));

        figment.extract().map_err(Box::new)
    }

    /// Load only the built-in defaults.
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// Get the global config file path.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("terra-engine").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_domain::EngineConfig;

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(
            config.into_engine_config().unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn test_global_config_path_names_project() {
        if let Some(path) = ConfigLoader::global_config_path() {
            assert!(path.to_string_lossy().contains("terra-engine"));
        }
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[engine]
max_workers = 3
"#,
        )
        .unwrap();

        let config = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(config.engine.max_workers, 3);
        // Everything else keeps its default
        assert_eq!(config.gateway.breaker_threshold, 3);
    }
}
