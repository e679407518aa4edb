//! Relationship edges between symbols, materialised as an in-memory graph
//! for BFS/DFS queries the persistent store is not well suited to answer
//! (dynamic-dispatch closure, base/override chains, impact radius).

use crate::types::{IdCode, RoleSet};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// The kind of edge between two symbols. A subset of [`RoleSet`]'s
/// relationship bits, broken out into its own enum for graph edges where a
/// single discrete kind (rather than a bitset) is the natural label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    ChildOf,
    BaseOf,
    OverrideOf,
    ReceivedBy,
    CalledBy,
    ExtendedBy,
    AccessorOf,
    ContainedBy,
    IbTypeOf,
    SpecializationOf,
}

impl RelationKind {
    pub fn as_role(self) -> RoleSet {
        match self {
            RelationKind::ChildOf => RoleSet::CHILD_OF,
            RelationKind::BaseOf => RoleSet::BASE_OF,
            RelationKind::OverrideOf => RoleSet::OVERRIDE_OF,
            RelationKind::ReceivedBy => RoleSet::RECEIVED_BY,
            RelationKind::CalledBy => RoleSet::CALLED_BY,
            RelationKind::ExtendedBy => RoleSet::EXTENDED_BY,
            RelationKind::AccessorOf => RoleSet::ACCESSOR_OF,
            RelationKind::ContainedBy => RoleSet::CONTAINED_BY,
            RelationKind::IbTypeOf => RoleSet::IB_TYPE_OF,
            RelationKind::SpecializationOf => RoleSet::SPECIALIZATION_OF,
        }
    }

    pub const ALL: [RelationKind; 10] = [
        RelationKind::ChildOf,
        RelationKind::BaseOf,
        RelationKind::OverrideOf,
        RelationKind::ReceivedBy,
        RelationKind::CalledBy,
        RelationKind::ExtendedBy,
        RelationKind::AccessorOf,
        RelationKind::ContainedBy,
        RelationKind::IbTypeOf,
        RelationKind::SpecializationOf,
    ];

    /// Every relation kind whose bit is set in `roles`, for decoding an
    /// occurrence's `(RoleSet, Usr)` relation tuples back into graph edges.
    pub fn from_role_bits(roles: RoleSet) -> impl Iterator<Item = RelationKind> {
        Self::ALL.into_iter().filter(move |kind| roles.contains(kind.as_role()))
    }
}

/// One directed edge: `from` plays `kind` with respect to `to` (e.g.
/// `from = D.f, kind = OverrideOf, to = C.f`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from: IdCode,
    pub kind: RelationKind,
    pub to: IdCode,
}

impl Relationship {
    pub fn new(from: IdCode, kind: RelationKind, to: IdCode) -> Self {
        Self { from, kind, to }
    }
}

/// In-memory directed graph over symbol USR codes, used by the call
/// resolver (4.F) to walk override/base/extension chains without round
/// tripping through the persistent store for every hop. Rebuilt from the
/// store's relationship rows at facade construction and kept incrementally
/// up to date as providers are imported.
pub struct RelationshipGraph {
    graph: DiGraph<IdCode, RelationKind>,
    nodes: HashMap<IdCode, NodeIndex>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            nodes: HashMap::new(),
        }
    }

    fn node(&mut self, code: IdCode) -> NodeIndex {
        *self.nodes.entry(code).or_insert_with(|| self.graph.add_node(code))
    }

    pub fn add_edge(&mut self, edge: Relationship) {
        let from = self.node(edge.from);
        let to = self.node(edge.to);
        self.graph.add_edge(from, to, edge.kind);
    }

    /// Symbols `code` relates to via `kind`, following edges outward
    /// (`code -> target`).
    pub fn related(&self, code: IdCode, kind: RelationKind) -> Vec<IdCode> {
        let Some(&idx) = self.nodes.get(&code) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, petgraph::Direction::Outgoing)
            .filter(|e| *e.weight() == kind)
            .map(|e| self.graph[e.target()])
            .collect()
    }

    /// Symbols that relate to `code` via `kind`, following edges inward
    /// (`source -> code`).
    pub fn related_by(&self, code: IdCode, kind: RelationKind) -> Vec<IdCode> {
        let Some(&idx) = self.nodes.get(&code) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, petgraph::Direction::Incoming)
            .filter(|e| *e.weight() == kind)
            .map(|e| self.graph[e.source()])
            .collect()
    }

    /// Transitive closure over `kind` edges starting at `code` (inclusive of
    /// `code` itself), used by the override-chain step of call resolution.
    pub fn transitive_related_by(&self, code: IdCode, kind: RelationKind) -> HashSet<IdCode> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(code);
        seen.insert(code);
        while let Some(current) = queue.pop_front() {
            for next in self.related_by(current, kind) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }
}

impl Default for RelationshipGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> IdCode {
        IdCode::of(s)
    }

    #[test]
    fn related_by_follows_incoming_edges() {
        let mut graph = RelationshipGraph::new();
        graph.add_edge(Relationship::new(code("D.f"), RelationKind::OverrideOf, code("C.f")));
        let overriders = graph.related_by(code("C.f"), RelationKind::OverrideOf);
        assert_eq!(overriders, vec![code("D.f")]);
    }

    #[test]
    fn transitive_related_by_walks_multiple_hops() {
        let mut graph = RelationshipGraph::new();
        graph.add_edge(Relationship::new(code("E.f"), RelationKind::OverrideOf, code("D.f")));
        graph.add_edge(Relationship::new(code("D.f"), RelationKind::OverrideOf, code("C.f")));
        let all = graph.transitive_related_by(code("C.f"), RelationKind::OverrideOf);
        assert!(all.contains(&code("C.f")));
        assert!(all.contains(&code("D.f")));
        assert!(all.contains(&code("E.f")));
    }
}
