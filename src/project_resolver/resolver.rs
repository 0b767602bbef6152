//! Stage-based settings resolution
//!
//! Routes a file to its build stage, maps the stage to its compilation
//! database directory under the build root and reads the sysroot from the
//! build cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{
    StageName, candidate_path, provider::SettingsProvider, router::RoutingTable,
    sysroot::SysrootLocator,
};
use crate::config::Settings;
use crate::error::{ResolveError, ResolveResult};

/// Language family the stage databases describe
pub const DEFAULT_LANGUAGE: &str = "cfamily";

/// A settings query from the analysis front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRequest {
    /// Language category reported by the front end (e.g. "cfamily")
    pub language: String,
    /// Absolute or project-root-relative source file
    pub filename: PathBuf,
}

impl SettingsRequest {
    pub fn new(language: impl Into<String>, filename: impl Into<PathBuf>) -> Self {
        Self {
            language: language.into(),
            filename: filename.into(),
        }
    }
}

/// Settings handed back to the front end for a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSettings {
    /// Directory holding `compile_commands.json`
    pub compilation_database_path: PathBuf,

    /// Stage that owns the file, absent for fixed-subtree providers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageName>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sysroot: Option<String>,
}

impl ResolvedSettings {
    /// Render the shape language-server front ends expect:
    /// `{"ls": {"compilationDatabasePath": "..."}}`
    pub fn to_ls_settings(&self) -> serde_json::Value {
        serde_json::json!({
            "ls": {
                "compilationDatabasePath": self.compilation_database_path,
            }
        })
    }
}

/// Stage -> database directory, relative to the build root
#[derive(Debug, Clone, Default)]
pub struct DatabaseTable {
    databases: BTreeMap<StageName, PathBuf>,
}

impl DatabaseTable {
    pub fn new<S, I, P>(entries: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, P)>,
        P: Into<PathBuf>,
    {
        Self {
            databases: entries
                .into_iter()
                .map(|(stage, path)| (StageName::new(stage), path.into()))
                .collect(),
        }
    }

    pub fn get(&self, stage: &StageName) -> Option<&Path> {
        self.databases.get(stage).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StageName, &Path)> {
        self.databases.iter().map(|(s, p)| (s, p.as_path()))
    }

    /// Routed stages that have no database entry
    pub fn missing_for<'a>(&self, routing: &'a RoutingTable) -> Vec<&'a StageName> {
        routing
            .stages()
            .filter(|stage| !self.databases.contains_key(*stage))
            .collect()
    }
}

/// Resolver for the whole project tree.
///
/// Holds only immutable tables, so one instance can serve any number of
/// requests from any thread.
#[derive(Debug, Clone)]
pub struct StageResolver {
    project_root: PathBuf,
    build_dir: PathBuf,
    language: String,
    routing: RoutingTable,
    databases: DatabaseTable,
    sysroot: SysrootLocator,
}

impl StageResolver {
    pub fn new(
        project_root: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
        routing: RoutingTable,
        databases: DatabaseTable,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            build_dir: build_dir.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            routing,
            databases,
            sysroot: SysrootLocator::default(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_sysroot_locator(mut self, locator: SysrootLocator) -> Self {
        self.sysroot = locator;
        self
    }

    /// Build the resolver from loaded settings, validating the routing table
    pub fn from_settings(settings: &Settings) -> ResolveResult<Self> {
        let routing = RoutingTable::new(
            settings
                .routing
                .iter()
                .map(|(stage, prefixes)| (stage.clone(), prefixes.clone())),
        )?;
        let databases = DatabaseTable::new(
            settings
                .databases
                .iter()
                .map(|(stage, path)| (stage.clone(), path.clone())),
        );

        Ok(Self::new(
            settings.project_root(),
            settings.build_root(),
            routing,
            databases,
        )
        .with_language(settings.language.clone())
        .with_sysroot_locator(SysrootLocator::new(
            settings.sysroot.cache_file.clone(),
            settings.sysroot.key.clone(),
        )))
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn databases(&self) -> &DatabaseTable {
        &self.databases
    }

    pub fn sysroot_locator(&self) -> &SysrootLocator {
        &self.sysroot
    }

    /// Stage owning `filename`, if any
    pub fn stage_for(&self, filename: &Path) -> Option<&StageName> {
        let candidate = candidate_path(filename, &self.project_root)?;
        self.routing.route(&candidate)
    }

    /// Database directory for `stage`. A routed stage without an entry means
    /// the two tables drifted apart.
    pub fn database_path(&self, stage: &StageName) -> ResolveResult<PathBuf> {
        let subpath = self
            .databases
            .get(stage)
            .ok_or_else(|| ResolveError::MissingDatabaseEntry {
                stage: stage.to_string(),
            })?;
        Ok(self.build_dir.join(subpath))
    }

    /// Resolve the settings for one request
    pub fn resolve(&self, request: &SettingsRequest) -> ResolveResult<Option<ResolvedSettings>> {
        if request.language != self.language {
            debug!(
                "ignoring '{}' request for {}",
                request.language,
                request.filename.display()
            );
            return Ok(None);
        }

        let Some(stage) = self.stage_for(&request.filename) else {
            return Ok(None);
        };

        let database = self.database_path(stage)?;
        let sysroot = self.sysroot.locate(&self.build_dir)?;

        if !database.exists() {
            debug!(
                "database for stage '{stage}' not built yet: {}",
                database.display()
            );
            return Ok(None);
        }

        Ok(Some(ResolvedSettings {
            compilation_database_path: database,
            stage: Some(stage.clone()),
            sysroot,
        }))
    }
}

impl SettingsProvider for StageResolver {
    fn provider_id(&self) -> &'static str {
        "stages"
    }

    fn scope(&self) -> Option<&str> {
        None
    }

    fn settings_for(&self, request: &SettingsRequest) -> ResolveResult<Option<ResolvedSettings>> {
        self.resolve(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CACHE: &str = "lf_os_sysroot:STRING=/opt/sysroot\n";

    fn tables() -> (RoutingTable, DatabaseTable) {
        let routing = RoutingTable::new([
            ("kernel", vec!["src/kernel"]),
            ("lib", vec!["src/lib", "src/lib/special"]),
        ])
        .unwrap();
        let databases = DatabaseTable::new([("kernel", "kernel-build"), ("lib", "lib-build")]);
        (routing, databases)
    }

    /// Project with a configured build dir and only the kernel database built
    fn project() -> (TempDir, StageResolver) {
        let temp_dir = TempDir::new().unwrap();
        let build = temp_dir.path().join("build");
        fs::create_dir_all(build.join("kernel-build")).unwrap();
        fs::write(build.join("CMakeCache.txt"), CACHE).unwrap();

        let (routing, databases) = tables();
        let resolver = StageResolver::new(temp_dir.path(), build, routing, databases);
        (temp_dir, resolver)
    }

    #[test]
    fn resolves_database_and_sysroot() {
        let (temp_dir, resolver) = project();
        let request = SettingsRequest::new("cfamily", "src/kernel/mm.c");

        let settings = resolver.resolve(&request).unwrap().unwrap();
        assert_eq!(
            settings.compilation_database_path,
            temp_dir.path().join("build").join("kernel-build")
        );
        assert_eq!(settings.stage, Some(StageName::from("kernel")));
        assert_eq!(settings.sysroot.as_deref(), Some("/opt/sysroot"));
    }

    #[test]
    fn absolute_filenames_are_routed() {
        let (temp_dir, resolver) = project();
        let request = SettingsRequest::new("cfamily", temp_dir.path().join("src/kernel/log.c"));
        assert!(resolver.resolve(&request).unwrap().is_some());
    }

    #[test]
    fn other_languages_are_ignored() {
        let (_temp_dir, resolver) = project();
        let request = SettingsRequest::new("python", "src/kernel/mm.c");
        assert_eq!(resolver.resolve(&request).unwrap(), None);
    }

    #[test]
    fn unrouted_files_resolve_to_nothing() {
        let (_temp_dir, resolver) = project();
        let request = SettingsRequest::new("cfamily", "util/embed.c");
        assert_eq!(resolver.resolve(&request).unwrap(), None);
    }

    #[test]
    fn unbuilt_database_resolves_to_nothing() {
        let (_temp_dir, resolver) = project();
        let request = SettingsRequest::new("cfamily", "src/lib/special/x.c");
        assert_eq!(resolver.resolve(&request).unwrap(), None);
    }

    #[test]
    fn missing_database_entry_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let (routing, _) = tables();
        let databases = DatabaseTable::new([("kernel", "kernel-build")]);
        let resolver =
            StageResolver::new(temp_dir.path(), temp_dir.path().join("build"), routing, databases);

        let err = resolver
            .resolve(&SettingsRequest::new("cfamily", "src/lib/a.c"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingDatabaseEntry { ref stage } if stage == "lib"));
    }

    #[test]
    fn missing_cache_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("build/kernel-build")).unwrap();
        let (routing, databases) = tables();
        let resolver =
            StageResolver::new(temp_dir.path(), temp_dir.path().join("build"), routing, databases);

        let err = resolver
            .resolve(&SettingsRequest::new("cfamily", "src/kernel/mm.c"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::CacheOpen { .. }));
    }

    #[test]
    fn missing_for_lists_unmapped_stages() {
        let (routing, _) = tables();
        let databases = DatabaseTable::new([("kernel", "kernel-build")]);
        let missing = databases.missing_for(&routing);
        assert_eq!(missing, vec![&StageName::from("lib")]);
    }

    #[test]
    fn ls_settings_shape() {
        let settings = ResolvedSettings {
            compilation_database_path: PathBuf::from("/b/stage"),
            stage: None,
            sysroot: None,
        };
        assert_eq!(
            settings.to_ls_settings(),
            serde_json::json!({"ls": {"compilationDatabasePath": "/b/stage"}})
        );
    }
}
