//! Fixed-database provider for a single subtree
//!
//! Some subtrees (the boot loader) are always built by one stage and carry
//! their own settings. This provider skips routing and sysroot lookup
//! entirely: it only checks that its database directory exists. It also
//! answers regardless of the request language.

use std::path::PathBuf;
use tracing::debug;

use super::{
    ResolveError, ResolveResult, clean_prefix,
    provider::SettingsProvider,
    resolver::{ResolvedSettings, SettingsRequest},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeResolver {
    scope: String,
    database: PathBuf,
}

impl SubtreeResolver {
    /// `scope` is the root-relative subtree, `database` the absolute database directory.
    ///
    /// The scope is cleaned like a routing prefix; one naming the whole
    /// project or lying outside it is rejected.
    pub fn new(scope: &str, database: impl Into<PathBuf>) -> ResolveResult<Self> {
        let scope = clean_prefix(scope)
            .filter(|cleaned| !cleaned.is_empty())
            .ok_or_else(|| {
                ResolveError::config(format!(
                    "subtree root '{scope}' must name a directory inside the project root"
                ))
            })?;

        Ok(Self {
            scope,
            database: database.into(),
        })
    }

    pub fn resolve(&self) -> Option<ResolvedSettings> {
        if !self.database.exists() {
            debug!(
                "subtree '{}' database not built yet: {}",
                self.scope,
                self.database.display()
            );
            return None;
        }

        Some(ResolvedSettings {
            compilation_database_path: self.database.clone(),
            stage: None,
            sysroot: None,
        })
    }
}

impl SettingsProvider for SubtreeResolver {
    fn provider_id(&self) -> &'static str {
        "subtree"
    }

    fn scope(&self) -> Option<&str> {
        Some(&self.scope)
    }

    fn settings_for(&self, _request: &SettingsRequest) -> ResolveResult<Option<ResolvedSettings>> {
        Ok(self.resolve())
    }
}
