//! Compilation database lookup for multi-stage build trees

pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod project_resolver;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{ResolveError, ResolveResult};
pub use project_resolver::{
    DatabaseTable, ResolvedSettings, RoutingTable, SettingsProvider, SettingsRequest,
    SimpleProviderRegistry, StageName, StageResolver, SubtreeResolver, SysrootLocator,
};
