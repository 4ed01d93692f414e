use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constant;
use crate::error::{Context, Error, Fallible};

/// Signature requirement level of a repo.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SigLevel {
    Never,
    #[default]
    Optional,
    Required,
}

/// A configured sync repository: a name, an ordered mirror list and the
/// signature level its archives must meet.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RepoConfig {
    pub name: String,
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub sig_level: SigLevel,
}

/// Builder pattern for generating [`Config`].
pub struct ConfigBuilder {
    /// Path of the config file.
    path: PathBuf,
}

impl ConfigBuilder {
    pub fn new<P: AsRef<Path>>(path: P) -> ConfigBuilder {
        ConfigBuilder {
            path: path.as_ref().to_owned(),
        }
    }

    /// Load the config file from the config path. A missing file yields
    /// the default configuration; a present but unparsable one is an
    /// error.
    pub fn build(&self) -> Fallible<Config> {
        let path = self.path.clone();
        let inner = if path.is_file() {
            let mut buf = vec![];
            std::fs::File::open(&path)
                .and_then(|mut f| f.read_to_end(&mut buf))
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_slice(&buf)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        } else {
            ConfigInner::default()
        };
        Ok(Config { path, inner })
    }
}

pub(crate) fn default_config_path() -> PathBuf {
    PathBuf::from(constant::DEFAULT_CONFIG_PATH)
}

/// Session configuration.
///
/// Relative `db_path`/`cache_path` values are resolved against the install
/// root, so a relocated root (tests, chroots) carries its state with it.
#[derive(Clone, Debug)]
pub struct Config {
    /// The file path of this [`Config`].
    pub path: PathBuf,

    inner: ConfigInner,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
struct ConfigInner {
    root: PathBuf,
    db_path: PathBuf,
    cache_path: PathBuf,
    /// Packages the sync planner must not touch without asking.
    ignored: Vec<String>,
    /// Glob list of paths protected from unlinking on commit.
    skip_remove: Vec<String>,
    check_space: bool,
    repos: Vec<RepoConfig>,
}

impl Default for ConfigInner {
    fn default() -> ConfigInner {
        ConfigInner {
            root: PathBuf::from(constant::DEFAULT_ROOT),
            db_path: PathBuf::from(constant::DEFAULT_DB_PATH),
            cache_path: PathBuf::from(constant::DEFAULT_CACHE_PATH),
            ignored: vec![],
            skip_remove: vec![],
            check_space: true,
            repos: vec![],
        }
    }
}

impl Config {
    #[inline]
    pub fn root_path(&self) -> &Path {
        &self.inner.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.inner.root.join(&self.inner.db_path)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.inner.root.join(&self.inner.cache_path)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.db_path().join(constant::LOCK_FILE)
    }

    pub fn local_db_path(&self) -> PathBuf {
        self.db_path().join("local")
    }

    pub fn sync_db_path(&self) -> PathBuf {
        self.db_path().join("sync")
    }

    #[inline]
    pub fn repos(&self) -> &[RepoConfig] {
        &self.inner.repos
    }

    #[inline]
    pub fn ignored(&self) -> &[String] {
        &self.inner.ignored
    }

    #[inline]
    pub fn skip_remove(&self) -> &[String] {
        &self.inner.skip_remove
    }

    #[inline]
    pub fn check_space(&self) -> bool {
        self.inner.check_space
    }

    /// Pretty-printed JSON of the whole config.
    pub fn pretty(&self) -> Fallible<String> {
        serde_json::to_string_pretty(&self.inner)
            .with_context(|| "failed to serialize config".to_owned())
    }

    /// Set a config key and persist the file.
    pub fn set(&mut self, key: &str, value: &str) -> Fallible<()> {
        match key {
            "root" => self.inner.root = PathBuf::from(value),
            "db_path" => self.inner.db_path = PathBuf::from(value),
            "cache_path" => self.inner.cache_path = PathBuf::from(value),
            "check_space" => {
                self.inner.check_space = value
                    .parse()
                    .map_err(|_| Error::InvalidConfigValue(value.to_owned()))?
            }
            key => return Err(Error::InvalidConfigKey(key.to_owned())),
        }
        self.save()
    }

    fn save(&self) -> Fallible<()> {
        if let Some(parent) = self.path.parent() {
            crate::internal::fs::ensure_dir(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(&self.inner)
            .with_context(|| "failed to serialize config".to_owned())?;
        std::fs::write(&self.path, data)
            .with_context(|| format!("failed to write config {}", self.path.display()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigBuilder::new(dir.path().join("config.json"))
            .build()
            .unwrap();
        assert_eq!(config.root_path(), Path::new("/"));
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/pact"));
        assert!(config.check_space());
    }

    #[test]
    fn test_relative_paths_follow_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, format!(r#"{{ "root": "{}" }}"#, dir.path().display())).unwrap();
        let config = ConfigBuilder::new(&path).build().unwrap();
        assert_eq!(config.db_path(), dir.path().join("var/lib/pact"));
    }

    #[test]
    fn test_set_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = ConfigBuilder::new(&path).build().unwrap();
        config.set("check_space", "false").unwrap();
        assert!(matches!(
            config.set("bogus", "1"),
            Err(Error::InvalidConfigKey(_))
        ));

        let reloaded = ConfigBuilder::new(&path).build().unwrap();
        assert!(!reloaded.check_space());
    }
}
