//! Compilation database resolution for a multi-stage build tree
//!
//! Answers "which compilation database (and sysroot) applies to this file?"
//! for an analysis tool. Each build stage owns a set of source subtrees and
//! produces its own `compile_commands.json` directory under the build root.
//!
//! - router: which stage owns a root-relative path (longest prefix)
//! - sysroot: which sysroot the configured build uses (`CMakeCache.txt`)
//! - resolver: both of the above combined into a [`ResolvedSettings`]
//! - subtree: fixed-database shortcut for a single subtree
//! - registry: picks the most specific provider for a file

pub mod provider;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod subtree;
pub mod sysroot;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

pub use crate::error::{ResolveError, ResolveResult};
pub use provider::SettingsProvider;
pub use registry::SimpleProviderRegistry;
pub use resolver::{DatabaseTable, ResolvedSettings, SettingsRequest, StageResolver};
pub use router::{RouteMatch, RoutingTable};
pub use subtree::SubtreeResolver;
pub use sysroot::SysrootLocator;

/// Build stage identifier newtype (e.g. "lowlevel", "userspace")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageName(String);

impl StageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Check whether `candidate` lies below `prefix`.
///
/// The prefix must be followed by a `/`, so `src/kernel` does not own
/// `src/kernel2/main.c`.
pub fn is_under(candidate: &str, prefix: &str) -> bool {
    candidate
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Normalize `path` into a `/`-separated path relative to `root`.
///
/// Relative inputs are taken as root-relative. Absolute inputs must live
/// under `root`; anything else has no candidate path. Both sides are
/// normalized lexically, the file does not need to exist.
pub fn candidate_path(path: &Path, root: &Path) -> Option<String> {
    let path = lexical_normalize(path);
    let relative = if path.is_absolute() {
        let root = lexical_normalize(root);
        path.strip_prefix(&root).ok()?.to_path_buf()
    } else {
        path
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            // A leading `..` escapes the root
            Component::ParentDir => return None,
            _ => {}
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Clean a configured root-relative prefix: `./src//kernel/` becomes `src/kernel`.
///
/// A prefix naming the root itself (`""`, `"."`, `"/"`) comes back empty.
/// Absolute prefixes and prefixes climbing out of the root yield `None`.
pub fn clean_prefix(prefix: &str) -> Option<String> {
    if prefix.split('/').all(|part| part.is_empty() || part == ".") {
        return Some(String::new());
    }
    if prefix.starts_with('/') {
        return None;
    }
    candidate_path(Path::new(prefix), Path::new(""))
}

/// Resolve `.` and `..` components without touching the filesystem
pub(crate) fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );
                if last_is_normal {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
