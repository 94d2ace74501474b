//! Partitioning of service ids by declared kind.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{ServiceDescriptor, ServiceKind};

/// Agent and simenv ids of a descriptor set.
///
/// The two sets are disjoint and together hold every input id. Unknown
/// kinds cannot occur here: they are rejected when a descriptor is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Agent ids.
    pub agents: BTreeSet<String>,
    /// Simenv ids.
    pub simenvs: BTreeSet<String>,
}

impl Partition {
    /// Splits `services` by kind.
    #[must_use]
    pub fn of(services: &BTreeMap<String, ServiceDescriptor>) -> Self {
        let mut partition = Self::default();
        for (id, descriptor) in services {
            match descriptor.kind {
                ServiceKind::Agent => partition.agents.insert(id.clone()),
                ServiceKind::Simenv => partition.simenvs.insert(id.clone()),
            };
        }
        partition
    }

    /// Agent ids in order.
    #[must_use]
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.iter().cloned().collect()
    }

    /// Simenv ids in order.
    #[must_use]
    pub fn simenv_ids(&self) -> Vec<String> {
        self.simenvs.iter().cloned().collect()
    }

    /// Total number of ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len() + self.simenvs.len()
    }

    /// True when there are no ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.simenvs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptors(kinds: &[ServiceKind]) -> BTreeMap<String, ServiceDescriptor> {
        kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| (format!("svc-{i:03}"), ServiceDescriptor::new(*kind, "localhost", 6000)))
            .collect()
    }

    #[test]
    fn partition_is_disjoint_and_complete() {
        // Walk every kind pattern up to 8 services.
        for n in 1..=8u32 {
            for mask in 0..(1u32 << n) {
                let kinds: Vec<_> = (0..n)
                    .map(|bit| {
                        if mask & (1 << bit) == 0 {
                            ServiceKind::Agent
                        } else {
                            ServiceKind::Simenv
                        }
                    })
                    .collect();
                let services = descriptors(&kinds);
                let p = Partition::of(&services);

                assert!(p.agents.is_disjoint(&p.simenvs));
                let union: BTreeSet<_> = p.agents.union(&p.simenvs).cloned().collect();
                let input: BTreeSet<_> = services.keys().cloned().collect();
                assert_eq!(union, input);
                assert_eq!(p.len(), services.len());
                assert_eq!(p.agents.len(), kinds.iter().filter(|k| **k == ServiceKind::Agent).count());
            }
        }
    }

    #[test]
    fn empty_input_gives_empty_partition() {
        assert!(Partition::of(&BTreeMap::new()).is_empty());
    }
}
