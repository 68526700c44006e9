pub mod bind_mount;
pub mod file_copy;
pub mod pvc;

use crate::errors::{ProvisionError, ReadinessError, TeardownError};
use async_trait::async_trait;
use nanoid::nanoid;
use std::{fmt, time::Duration};

/// Lowercase alphanumerics only, so a namespace is a valid Kubernetes
/// object name and a valid directory name on every platform we touch.
const NS_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Unique per-trial prefix. Every resource a trial creates is named under
/// its namespace, so identically-sized repetitions never collide and
/// stale resources from an interrupted run are never mistaken for ours.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrialNamespace(String);

impl TrialNamespace {
    pub fn generate(label: &str) -> Self {
        Self(format!("{}-{}", label, nanoid!(8, &NS_ALPHABET)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name for the i-th resource in the set.
    pub fn member(&self, index: u32) -> String {
        format!("{}-{}", self.0, index)
    }
}

impl fmt::Display for TrialNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resources provisioned by one trial. Owned exclusively by the trial
/// that created them and handed back to the same workload for teardown.
pub trait ResourceSet: Send {
    fn namespace(&self) -> &TrialNamespace;

    /// True once nothing is tracked any more, i.e. teardown removed
    /// everything it was responsible for.
    fn is_empty(&self) -> bool;
}

/// One pluggable provisioning mechanism under test.
///
/// The sweep, trial and aggregation logic is identical for every
/// implementation; only these four methods differ. `provision` records
/// everything it creates (including partial creations on failure) in the
/// resource set so `teardown` can always clean up. `teardown` must be
/// idempotent and must not stop at the first removal failure: it removes
/// everything removable and reports what it could not remove.
#[async_trait]
pub trait Workload: Send + Sync {
    type Resources: ResourceSet;

    fn label(&self) -> &'static str;

    /// Column name for the size field in the output record.
    fn size_field(&self) -> &'static str;

    fn new_resources(&self, namespace: TrialNamespace) -> Self::Resources;

    /// Per-size setup that must not count towards the measurement, e.g.
    /// building the source material a copy reads from.
    async fn prepare(&self, _size: u32) -> Result<(), ProvisionError> {
        Ok(())
    }

    /// Creates `size` resource instances under the set's namespace.
    async fn provision(
        &self,
        size: u32,
        resources: &mut Self::Resources,
    ) -> Result<(), ProvisionError>;

    /// Blocks until every resource in the set is usable.
    async fn await_ready(
        &self,
        resources: &Self::Resources,
        timeout: Duration,
    ) -> Result<(), ReadinessError>;

    /// Removes every resource the set still tracks.
    async fn teardown(&self, resources: &mut Self::Resources) -> Result<(), TeardownError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn namespaces_are_unique() {
        let namespaces: HashSet<String> = (0..1000)
            .map(|_| TrialNamespace::generate("mount").as_str().to_string())
            .collect();
        assert_eq!(namespaces.len(), 1000);
    }

    #[test]
    fn member_names_carry_the_namespace_prefix() {
        let ns = TrialNamespace::generate("pvc");
        let member = ns.member(7);
        assert!(member.starts_with(ns.as_str()));
        assert!(member.ends_with("-7"));
    }

    #[test]
    fn namespaces_are_valid_k8s_names() {
        let ns = TrialNamespace::generate("pvc");
        assert!(ns
            .as_str()
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }
}
