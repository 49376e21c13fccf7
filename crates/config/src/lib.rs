//! Storage and repository configuration.
//!
//! Values are layered with `figment`: built-in defaults, then a config file
//! (TOML, YAML or JSON, chosen by extension), then `DEPOT_`-prefixed
//! environment variables using `__` to separate nested keys, e.g.
//! `DEPOT_METADATA__EXPIRY_SECONDS=120`.

pub mod error;
mod model;

pub use crate::model::{
    Config, MemberRef, MetadataConfig, RepositoryConfig, RepositoryKind, RepositoryPolicy, StorageConfig,
};
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "DEPOT_";
pub const CONFIG_FILE: &str = "depot.toml";

/// `depot.toml` in the platform's per-user config directory, if one exists.
pub fn default_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "depot")?;
    Some(dirs.config_dir().join(CONFIG_FILE))
}

/// Defaults merged with the file at `path`, without the environment layer.
pub fn file_figment(path: Option<&Path>) -> Figment {
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let Some(path) = path else {
        return figment;
    };
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

/// Extract and validate a configuration from an assembled figment.
pub fn extract(figment: &Figment) -> Result<Config> {
    let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`, or from [`default_path()`] when not
/// given, then apply environment overrides.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => default_path().filter(|path| path.exists()),
    };
    match &path {
        Some(path) => tracing::debug!(path = %path.display(), "loading configuration file"),
        None => tracing::debug!("no configuration file, using defaults and environment"),
    }
    let figment = file_figment(path.as_deref()).merge(Env::prefixed(ENV_PREFIX).split("__"));
    let config = extract(&figment)?;
    tracing::info!(storages = config.storages.len(), "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TOML: &str = r#"
[metadata]
expiry_seconds = 120
checksums = ["sha256", "sha512"]

[storages.storage0]
basedir = "/var/lib/depot/storage0"

[storages.storage0.repositories.releases]
layout = "maven"
policy = "release"

[storages.storage0.repositories.public]
layout = "maven"
kind = "group"
members = ["releases", "storage1:thirdparty"]

[storages.storage1]
basedir = "/var/lib/depot/storage1"

[storages.storage1.repositories.thirdparty]
layout = "maven"
kind = "proxy"
"#;

    #[test]
    fn test_defaults() {
        let config = extract(&file_figment(None)).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.metadata.expiry_seconds, 60);
        assert_eq!(config.metadata.checksums, ["sha256"]);
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("depot.toml");
        fs::write(&path, TOML).unwrap();

        let config = extract(&file_figment(Some(&path))).unwrap();
        assert_eq!(config.metadata.expiry().as_secs(), 120);
        let public = config.repository("storage0", "public").unwrap();
        assert_eq!(public.kind, RepositoryKind::Group);
        assert_eq!(public.members, [MemberRef::local("releases"), MemberRef::remote("storage1", "thirdparty")]);
        let releases = config.repository("storage0", "releases").unwrap();
        assert_eq!(releases.kind, RepositoryKind::Hosted);
        assert_eq!(releases.policy, RepositoryPolicy::Release);
        assert_eq!(config.storages["storage1"].basedir, PathBuf::from("/var/lib/depot/storage1"));
    }

    #[test]
    fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("depot.yaml");
        fs::write(
            &path,
            "storages:\n  s:\n    basedir: /tmp/s\n    repositories:\n      npm-local:\n        layout: npm\n",
        )
        .unwrap();

        let config = extract(&file_figment(Some(&path))).unwrap();
        assert_eq!(config.repository("s", "npm-local").unwrap().layout, "npm");
        assert_eq!(config.metadata, MetadataConfig::default());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("depot.toml");
        fs::write(&path, "[storages.s]\nbasedir = \"/tmp\"\n[storages.s.repositories.g]\nlayout = \"maven\"\nkind = \"group\"\nmembers = [\"missing\"]\n").unwrap();
        let err = extract(&file_figment(Some(&path))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnresolvedMember { .. }));

        fs::write(&path, "[storages.s]\nbasedir = \"/tmp\"\n[storages.s.repositories.g]\nlayout = \"maven\"\nkind = \"federated\"\n").unwrap();
        assert_eq!(*extract(&file_figment(Some(&path))).unwrap_err(), ErrorKind::Load);
    }
}
