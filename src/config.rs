//! Configuration module for compilation database resolution.
//!
//! This module provides a layered configuration system that supports:
//! - Default values (the stage layout of the build tree)
//! - TOML configuration file (`.stagedb/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `STAGEDB_` and use double
//! underscores to separate nested levels:
//! - `STAGEDB_BUILD_DIR=out` sets `build_dir`
//! - `STAGEDB_SYSROOT__KEY=my_sysroot` sets `sysroot.key`
//! - `STAGEDB_DEBUG=true` sets `debug`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::project_resolver::resolver::DEFAULT_LANGUAGE;
use crate::project_resolver::sysroot::{DEFAULT_CACHE_FILE, DEFAULT_SYSROOT_KEY};

/// Directory marking the workspace root
pub const CONFIG_DIR: &str = ".stagedb";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Project root all source paths are relative to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,

    /// Build root holding the stage build directories (relative to the project root)
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Language category the stage databases apply to
    #[serde(default = "default_language")]
    pub language: String,

    /// Where the sysroot is read from
    #[serde(default)]
    pub sysroot: SysrootConfig,

    /// Stage name -> source prefixes owned by that stage
    #[serde(default = "default_routing")]
    pub routing: BTreeMap<String, Vec<String>>,

    /// Stage name -> compilation database directory (relative to the build root)
    #[serde(default = "default_databases")]
    pub databases: BTreeMap<String, PathBuf>,

    /// Subtrees with a fixed database, bypassing stage routing
    #[serde(default = "default_subtrees")]
    pub subtrees: Vec<SubtreeConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SysrootConfig {
    /// Cache file inside the build root
    #[serde(default = "default_cache_file")]
    pub cache_file: String,

    /// Cache key holding the sysroot
    #[serde(default = "default_sysroot_key")]
    pub key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SubtreeConfig {
    /// Root-relative subtree
    pub root: String,

    /// Database directory (relative to the project root)
    pub database: PathBuf,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}
fn default_false() -> bool {
    false
}
fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}
fn default_cache_file() -> String {
    DEFAULT_CACHE_FILE.to_string()
}
fn default_sysroot_key() -> String {
    DEFAULT_SYSROOT_KEY.to_string()
}

fn stage_build_dir(stage: &str) -> PathBuf {
    PathBuf::from(format!("stage_{stage}-prefix/src/stage_{stage}-build"))
}

fn default_routing() -> BTreeMap<String, Vec<String>> {
    let mut routing = BTreeMap::new();
    routing.insert(
        "lowlevel".to_string(),
        vec!["src/loader".to_string(), "src/kernel".to_string()],
    );
    routing.insert(
        "stdlibs".to_string(),
        vec![
            "src/llvm/libcxx".to_string(),
            "src/llvm/libcxxabi".to_string(),
            "src/llvm/compiler-rt".to_string(),
            "src/userspace/lib9p/lib".to_string(),
            "src/newlib".to_string(),
        ],
    );
    routing.insert("userspace".to_string(), vec!["src/userspace".to_string()]);
    routing.insert(
        "initramfs".to_string(),
        vec!["src/userspace/lib9p/example/server".to_string()],
    );
    routing
}

fn default_databases() -> BTreeMap<String, PathBuf> {
    ["lowlevel", "stdlibs", "userspace", "initramfs"]
        .into_iter()
        .map(|stage| (stage.to_string(), stage_build_dir(stage)))
        .collect()
}

fn default_subtrees() -> Vec<SubtreeConfig> {
    vec![SubtreeConfig {
        root: "src/loader".to_string(),
        database: default_build_dir().join(stage_build_dir("lowlevel")),
    }]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            project_root: None,
            build_dir: default_build_dir(),
            debug: false,
            language: default_language(),
            sysroot: SysrootConfig::default(),
            routing: default_routing(),
            databases: default_databases(),
            subtrees: default_subtrees(),
        }
    }
}

impl Default for SysrootConfig {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(),
            key: default_sysroot_key(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .stagedb directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If project_root is not set in config, use the workspace root
                if settings.project_root.is_none() {
                    settings.project_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    ///
    /// Without an explicit `project_root`, the project is the directory
    /// holding the file's `.stagedb` directory (or the file's own directory).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        let path = path.as_ref();
        Self::figment(path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.project_root.is_none() {
                    settings.project_root = Self::root_of_config(path);
                }
                settings
            })
    }

    fn root_of_config(path: &Path) -> Option<PathBuf> {
        let dir = path.parent()?;
        if dir.file_name() == Some(OsStr::new(CONFIG_DIR)) {
            dir.parent().map(Path::to_path_buf)
        } else {
            Some(dir.to_path_buf())
        }
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore (__) separates nested levels
            .merge(Env::prefixed("STAGEDB_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the workspace config by looking for .stagedb directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .stagedb is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }

        None
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'stagedb init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Absolute project root (falls back to the current directory)
    pub fn project_root(&self) -> PathBuf {
        let current = std::env::current_dir().unwrap_or_default();
        match &self.project_root {
            Some(root) => current.join(root),
            None => current,
        }
    }

    /// Absolute build root
    pub fn build_root(&self) -> PathBuf {
        self.project_root().join(&self.build_dir)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&config_path, DEFAULT_TEMPLATE)?;
        Ok(config_path)
    }
}

const DEFAULT_TEMPLATE: &str = r#"# stagedb configuration

# Version of the configuration schema
version = 1

# Project root (defaults to the directory holding .stagedb)
# project_root = "/path/to/project"

# Build root, relative to the project root
build_dir = "build"

# Global debug mode
debug = false

# Language category served by the stage databases
language = "cfamily"

[sysroot]
# Cache file inside the build root and the key holding the sysroot
cache_file = "CMakeCache.txt"
key = "lf_os_sysroot"

# Stage -> source prefixes. The longest matching prefix owns a file.
# A prefix may only be listed under one stage.
[routing]
lowlevel = ["src/loader", "src/kernel"]
stdlibs = [
    "src/llvm/libcxx",
    "src/llvm/libcxxabi",
    "src/llvm/compiler-rt",
    "src/userspace/lib9p/lib",
    "src/newlib",
]
userspace = ["src/userspace"]
initramfs = ["src/userspace/lib9p/example/server"]

# Stage -> compilation database directory, relative to the build root.
# Every stage in [routing] needs an entry here.
[databases]
lowlevel = "stage_lowlevel-prefix/src/stage_lowlevel-build"
stdlibs = "stage_stdlibs-prefix/src/stage_stdlibs-build"
userspace = "stage_userspace-prefix/src/stage_userspace-build"
initramfs = "stage_initramfs-prefix/src/stage_initramfs-build"

# Subtrees answered from a fixed database, relative to the project root.
# No routing and no sysroot lookup happens for these.
[[subtrees]]
root = "src/loader"
database = "build/stage_lowlevel-prefix/src/stage_lowlevel-build"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.build_dir, PathBuf::from("build"));
        assert_eq!(settings.language, "cfamily");
        assert_eq!(settings.sysroot.key, "lf_os_sysroot");
        assert_eq!(settings.routing.len(), 4);
        assert_eq!(
            settings.databases["stdlibs"],
            PathBuf::from("stage_stdlibs-prefix/src/stage_stdlibs-build")
        );
        assert_eq!(settings.subtrees.len(), 1);
    }

    #[test]
    fn test_every_default_stage_has_a_database() {
        let settings = Settings::default();
        for stage in settings.routing.keys() {
            assert!(settings.databases.contains_key(stage), "{stage}");
        }
    }

    #[test]
    fn test_template_matches_defaults() {
        let from_template: Settings = toml::from_str(DEFAULT_TEMPLATE).unwrap();
        let defaults = Settings::default();
        assert_eq!(from_template.routing, defaults.routing);
        assert_eq!(from_template.databases, defaults.databases);
        assert_eq!(from_template.subtrees, defaults.subtrees);
        assert_eq!(from_template.sysroot, defaults.sysroot);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2
build_dir = "out"
language = "c"

[routing]
tools = ["util"]

[databases]
tools = "tools-build"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.build_dir, PathBuf::from("out"));
        assert_eq!(settings.language, "c");
        // File tables extend the defaults
        assert_eq!(settings.routing["tools"], vec!["util"]);
        assert!(settings.routing.contains_key("lowlevel"));
        assert_eq!(settings.databases["tools"], PathBuf::from("tools-build"));
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "debug = true\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();

        assert!(settings.debug);
        // Default values should still be present
        assert_eq!(settings.version, 1);
        assert_eq!(settings.sysroot.cache_file, "CMakeCache.txt");
        assert_eq!(settings.routing["userspace"], vec!["src/userspace"]);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.build_dir = PathBuf::from("build-debug");
        settings
            .routing
            .insert("tools".to_string(), vec!["util".to_string()]);

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.build_dir, PathBuf::from("build-debug"));
        assert_eq!(loaded.routing["tools"], vec!["util"]);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[sysroot]\nkey = \"from_file\"\n").unwrap();

        unsafe {
            std::env::set_var("STAGEDB_SYSROOT__KEY", "from_env");
        }
        let settings = Settings::load_from(&config_path).unwrap();
        unsafe {
            std::env::remove_var("STAGEDB_SYSROOT__KEY");
        }

        assert_eq!(settings.sysroot.key, "from_env");
        // Untouched nested field keeps its default
        assert_eq!(settings.sysroot.cache_file, "CMakeCache.txt");
    }

    #[test]
    fn test_load_from_workspace_config_sets_project_root() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_DIR).join("settings.toml");
        fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        fs::write(&config_path, "build_dir = \"out\"\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.project_root(), temp_dir.path());
        assert_eq!(settings.build_root(), temp_dir.path().join("out"));
    }

    #[test]
    fn test_load_from_keeps_explicit_project_root() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "project_root = \"/work/lf-os\"\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.project_root(), PathBuf::from("/work/lf-os"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[routing\nlowlevel = 3\n").unwrap();

        assert!(Settings::load_from(&config_path).is_err());
    }

    #[test]
    fn test_build_root_is_under_project_root() {
        let settings = Settings {
            project_root: Some(PathBuf::from("/work/lf-os")),
            ..Settings::default()
        };
        assert_eq!(settings.project_root(), PathBuf::from("/work/lf-os"));
        assert_eq!(settings.build_root(), PathBuf::from("/work/lf-os/build"));
    }
}
