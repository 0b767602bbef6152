//! Provider registry for compilation database resolution

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{
    ResolveResult, candidate_path, is_under,
    provider::SettingsProvider,
    resolver::{ResolvedSettings, SettingsRequest, StageResolver},
    subtree::SubtreeResolver,
};
use crate::config::Settings;

/// Registry that dispatches each request to the most specific provider
pub struct SimpleProviderRegistry {
    project_root: PathBuf,
    providers: Vec<Arc<dyn SettingsProvider>>,
}

impl SimpleProviderRegistry {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            providers: Vec::new(),
        }
    }

    pub fn add(&mut self, provider: Arc<dyn SettingsProvider>) {
        self.providers.push(provider);
    }

    /// Register the stage resolver plus one provider per configured subtree
    pub fn from_settings(settings: &Settings) -> ResolveResult<Self> {
        let project_root = settings.project_root();
        let mut registry = Self::new(&project_root);

        registry.add(Arc::new(StageResolver::from_settings(settings)?));
        for subtree in &settings.subtrees {
            registry.add(Arc::new(SubtreeResolver::new(
                &subtree.root,
                project_root.join(&subtree.database),
            )?));
        }

        Ok(registry)
    }

    /// Pick the provider for `filename`.
    ///
    /// The scoped provider with the longest scope containing the file wins;
    /// an unscoped provider is the fallback.
    pub fn provider_for(&self, filename: &Path) -> Option<&Arc<dyn SettingsProvider>> {
        let candidate = candidate_path(filename, &self.project_root);

        let scoped = candidate.as_deref().and_then(|candidate| {
            self.providers
                .iter()
                .filter_map(|p| p.scope().map(|scope| (p, scope)))
                .filter(|(_, scope)| is_under(candidate, scope))
                .max_by_key(|(_, scope)| scope.len())
                .map(|(p, _)| p)
        });

        scoped.or_else(|| self.providers.iter().find(|p| p.scope().is_none()))
    }

    /// Resolve `request` through the provider responsible for its file
    pub fn resolve(&self, request: &SettingsRequest) -> ResolveResult<Option<ResolvedSettings>> {
        let Some(provider) = self.provider_for(&request.filename) else {
            debug!("no provider for {}", request.filename.display());
            return Ok(None);
        };

        debug!(
            "{} handled by provider '{}'",
            request.filename.display(),
            provider.provider_id()
        );
        provider.settings_for(request)
    }
}
