//! Stage router: maps a root-relative path to the build stage that owns it

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::{StageName, clean_prefix, is_under};
use crate::error::{ResolveError, ResolveResult};

/// Immutable stage -> path prefix table.
///
/// A prefix may appear under one stage only. Two different prefixes of the
/// same length can never both own a path, so with duplicates rejected the
/// longest match is always unique.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    stages: BTreeMap<StageName, Vec<String>>,
}

/// The stage and prefix that won a routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub stage: &'a StageName,
    pub prefix: &'a str,
}

impl RoutingTable {
    /// Build a table from `(stage, prefixes)` entries.
    ///
    /// Prefixes are cleaned lexically (`./src//kernel/` is `src/kernel`).
    /// Empty prefixes, prefixes outside the project root and prefixes
    /// listed under more than one stage are rejected.
    pub fn new<S, I, P>(entries: I) -> ResolveResult<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Vec<P>)>,
        P: AsRef<str>,
    {
        let mut stages: BTreeMap<StageName, Vec<String>> = BTreeMap::new();
        let mut owners: HashMap<String, StageName> = HashMap::new();

        for (stage, prefixes) in entries {
            let stage = StageName::new(stage);
            let list = stages.entry(stage.clone()).or_default();

            for prefix in prefixes {
                let raw = prefix.as_ref();
                let cleaned = clean_prefix(raw).ok_or_else(|| {
                    ResolveError::config(format!(
                        "prefix '{raw}' of stage '{stage}' must stay inside the project root"
                    ))
                })?;
                let prefix = cleaned.as_str();
                if prefix.is_empty() {
                    return Err(ResolveError::EmptyPrefix {
                        stage: stage.to_string(),
                    });
                }

                if let Some(owner) = owners.get(prefix) {
                    if owner != &stage {
                        return Err(ResolveError::DuplicatePrefix {
                            prefix: prefix.to_string(),
                            first: owner.to_string(),
                            second: stage.to_string(),
                        });
                    }
                    continue;
                }

                owners.insert(prefix.to_string(), stage.clone());
                list.push(prefix.to_string());
            }
        }

        Ok(Self { stages })
    }

    /// Find the stage owning `candidate`, a `/`-separated root-relative path
    pub fn route(&self, candidate: &str) -> Option<&StageName> {
        self.route_match(candidate).map(|m| m.stage)
    }

    /// Like [`route`](Self::route) but also reports the winning prefix
    pub fn route_match(&self, candidate: &str) -> Option<RouteMatch<'_>> {
        let best = self
            .entries()
            .filter(|(_, prefix)| is_under(candidate, prefix))
            .max_by_key(|(_, prefix)| prefix.len())
            .map(|(stage, prefix)| RouteMatch { stage, prefix });

        match &best {
            Some(m) => debug!("routed '{candidate}' to stage '{}' via '{}'", m.stage, m.prefix),
            None => debug!("no stage owns '{candidate}'"),
        }
        best
    }

    /// Every `(stage, prefix)` pair in table order
    pub fn entries(&self) -> impl Iterator<Item = (&StageName, &str)> {
        self.stages
            .iter()
            .flat_map(|(stage, prefixes)| prefixes.iter().map(move |p| (stage, p.as_str())))
    }

    pub fn stages(&self) -> impl Iterator<Item = &StageName> {
        self.stages.keys()
    }

    pub fn prefixes(&self, stage: &StageName) -> Option<&[String]> {
        self.stages.get(stage).map(Vec::as_slice)
    }
}
