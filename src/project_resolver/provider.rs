//! Core provider trait for compilation database resolution

use super::{ResolveResult, resolver::ResolvedSettings, resolver::SettingsRequest};

/// Implemented by everything that can answer a settings request.
///
/// A provider either covers the whole project (`scope() == None`) or one
/// subtree of it. When scopes nest, the registry hands the request to the
/// most specific provider.
pub trait SettingsProvider: Send + Sync {
    /// Short identifier used in logs and CLI output
    fn provider_id(&self) -> &'static str;

    /// Root-relative directory this provider is limited to
    fn scope(&self) -> Option<&str>;

    /// Answer a request. `Ok(None)` means no settings apply.
    fn settings_for(&self, request: &SettingsRequest) -> ResolveResult<Option<ResolvedSettings>>;
}
