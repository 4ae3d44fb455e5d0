use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "ZenDocs";
const APP_NAME: &str = "zendocs";

pub const CONFIG_ENV: &str = "ZENDOCS_CONFIG";
pub const DATA_ENV: &str = "ZENDOCS_DATA";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub blob_dir: PathBuf,
    pub state_dir: PathBuf,
    pub ui_state_file: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        // An overridden data dir keeps the UI state next to the data it describes.
        let state_dir = match &override_data {
            Some(root) => root.join("state"),
            None => project_dirs
                .state_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| project_dirs.data_dir().join("state")),
        };
        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());

        Ok(Self::rooted(config_dir, config_file, data_root, state_dir))
    }

    /// Every path placed under one directory.
    pub fn under(root: &Path) -> Self {
        let config_dir = root.join("config");
        let config_file = config_dir.join("config.toml");
        Self::rooted(config_dir, config_file, root.join("data"), root.join("state"))
    }

    fn rooted(config_dir: PathBuf, config_file: PathBuf, data_dir: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("docs.db"),
            blob_dir: data_dir.join("blobs"),
            ui_state_file: state_dir.join("ui_state.json"),
            config_dir,
            config_file,
            data_dir,
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.blob_dir, &self.state_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayOptions,
    pub sync: SyncOptions,
    pub search: SearchOptions,
    pub session: SessionOptions,
    pub tree: TreeOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.gateway
            .resolve(paths)
            .context("resolving gateway paths")?;
        if self.search.max_results == 0 {
            tracing::warn!("search.max_results of 0 would hide every hit, using default");
            self.search.max_results = SearchOptions::default().max_results;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    #[serde(skip)]
    pub blob_dir: PathBuf,
    pub wal_autocheckpoint: u32,
    pub busy_timeout_ms: u64,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            blob_dir: PathBuf::new(),
            wal_autocheckpoint: 1000,
            busy_timeout_ms: 5_000,
        }
    }
}

impl GatewayOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        if self.blob_dir.as_os_str().is_empty() {
            self.blob_dir = paths.blob_dir.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Failed remote writes only reach the log.
    #[default]
    Log,
    /// Failed remote writes also become user-visible notices.
    Notify,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub on_failure: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { max_results: 200 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Signs this user in when no `--user` flag is given.
    pub default_user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    pub max_title_width: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self { max_title_width: 40 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_load_writes_default_config() -> Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(ConfigPaths::under(temp.path()));
        let cfg = loader.load_or_init()?;
        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.gateway.database_path, temp.path().join("data/docs.db"));
        assert_eq!(cfg.sync.on_failure, FailurePolicy::Log);
        Ok(())
    }

    #[test]
    fn partial_config_keeps_defaults() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            "[sync]\non_failure = \"notify\"\n\n[search]\nmax_results = 0\n",
        )?;
        let cfg = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(cfg.sync.on_failure, FailurePolicy::Notify);
        assert_eq!(cfg.search.max_results, 200);
        assert_eq!(cfg.tree.max_title_width, 40);
        Ok(())
    }

    #[test]
    fn data_override_moves_ui_state_with_it() -> Result<()> {
        let temp = TempDir::new()?;
        let config_file = temp.path().join("conf/zendocs.toml");
        env::set_var(CONFIG_ENV, &config_file);
        env::set_var(DATA_ENV, temp.path().join("data"));
        let discovered = ConfigPaths::discover();
        env::remove_var(CONFIG_ENV);
        env::remove_var(DATA_ENV);

        let paths = discovered?;
        assert_eq!(paths.config_file, config_file);
        assert_eq!(paths.database_path, temp.path().join("data/docs.db"));
        assert_eq!(
            paths.ui_state_file,
            temp.path().join("data/state/ui_state.json")
        );
        Ok(())
    }
}
