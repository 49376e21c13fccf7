//! Group containment as a directed graph.
//!
//! Nodes are repositories; an edge `G → M` means group `G` lists `M` as a
//! member. Configuration may contain cycles; nothing here recurses, so cyclic
//! graphs are safe to query.

use crate::repository::{Repository, RepositoryId};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct RepositoryGraph {
    /// Edge weight is the member's position in the group's member list.
    graph: DiGraph<RepositoryId, usize>,
    nodes: HashMap<RepositoryId, NodeIndex>,
}

impl RepositoryGraph {
    /// Build the graph from repository definitions. Member references to
    /// repositories that are not in `repositories` are dropped.
    pub fn build<'a>(repositories: impl IntoIterator<Item = &'a Repository>) -> Self {
        let repositories: Vec<&Repository> = repositories.into_iter().collect();
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for repository in &repositories {
            let index = graph.add_node(repository.id().clone());
            nodes.insert(repository.id().clone(), index);
        }
        for repository in &repositories {
            let group = nodes[repository.id()];
            for (position, member) in repository.members().iter().enumerate() {
                match nodes.get(member) {
                    Some(&member) => {
                        graph.add_edge(group, member, position);
                    },
                    None => tracing::warn!(group = %repository.id(), %member, "ignoring unknown group member"),
                }
            }
        }
        Self { graph, nodes }
    }

    pub fn contains(&self, id: &RepositoryId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Direct members of `group`, in configured order.
    pub fn members(&self, group: &RepositoryId) -> Vec<RepositoryId> {
        let Some(&index) = self.nodes.get(group) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges_directed(index, Direction::Outgoing).collect();
        edges.sort_by_key(|edge| *edge.weight());
        edges.into_iter().map(|edge| self.graph[edge.target()].clone()).collect()
    }

    /// Groups that list `member` directly, sorted by id.
    pub fn direct_parents(&self, member: &RepositoryId) -> Vec<RepositoryId> {
        let Some(&index) = self.nodes.get(member) else {
            return Vec::new();
        };
        let parents: BTreeSet<RepositoryId> = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .map(|parent| self.graph[parent].clone())
            .collect();
        parents.into_iter().collect()
    }

    /// Every group that contains `member`, directly or through nested groups,
    /// nearest first. `member` itself is never included, even when it sits on
    /// a cycle.
    pub fn ancestors(&self, member: &RepositoryId) -> Vec<RepositoryId> {
        let mut seen = HashSet::from([member.clone()]);
        let mut queue: VecDeque<RepositoryId> = self.direct_parents(member).into();
        let mut ancestors = Vec::new();
        while let Some(group) = queue.pop_front() {
            if !seen.insert(group.clone()) {
                continue;
            }
            queue.extend(self.direct_parents(&group));
            ancestors.push(group);
        }
        ancestors
    }

    /// Groups of repositories that contain each other, each sorted by id.
    /// A group listing itself is a cycle of one.
    pub fn cycles(&self) -> Vec<Vec<RepositoryId>> {
        let mut cycles: Vec<Vec<RepositoryId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| match component.as_slice() {
                [single] => self.graph.contains_edge(*single, *single),
                _ => true,
            })
            .map(|component| {
                let mut ids: Vec<RepositoryId> = component.into_iter().map(|index| self.graph[index].clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }
}
