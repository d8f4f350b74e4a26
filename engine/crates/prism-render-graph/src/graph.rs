//! pass 之间的依赖图
//!
//! barrier 推导时发现的每个 hazard 都记录为一条有类型的边，
//! 便于调试和查询，执行顺序始终是 pass 的提交顺序。

use itertools::Itertools;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::pass::RgPassId;
use crate::resource::RgResourceId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RgDependencyKind {
    ReadAfterWrite,
    WriteAfterWrite,
    WriteAfterRead,
}

/// 依赖边：从 producer 到 consumer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RgDependency {
    pub kind: RgDependencyKind,
    pub resource: RgResourceId,
}

#[derive(Default)]
pub struct RgDependencyGraph {
    graph: DiGraph<RgPassId, RgDependency>,
}

// new & init
impl RgDependencyGraph {
    pub fn new(pass_count: usize) -> Self {
        let mut graph = DiGraph::with_capacity(pass_count, pass_count);
        for index in 0..pass_count {
            graph.add_node(RgPassId(index as u32));
        }
        Self { graph }
    }
}

// getters
impl RgDependencyGraph {
    #[inline]
    pub fn pass_count(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// 直接依赖的 pass，升序，不重复
    pub fn predecessors(&self, pass: RgPassId) -> Vec<RgPassId> {
        self.neighbors(pass, Direction::Incoming)
    }

    /// 直接依赖于该 pass 的 pass，升序，不重复
    pub fn successors(&self, pass: RgPassId) -> Vec<RgPassId> {
        self.neighbors(pass, Direction::Outgoing)
    }

    /// 所有边：(producer, consumer, 依赖)
    pub fn edges(&self) -> impl Iterator<Item = (RgPassId, RgPassId, &RgDependency)> {
        self.graph.raw_edges().iter().map(|e| (self.graph[e.source()], self.graph[e.target()], &e.weight))
    }

    pub fn has_dependency(&self, producer: RgPassId, consumer: RgPassId) -> bool {
        self.graph.find_edge(Self::node(producer), Self::node(consumer)).is_some()
    }
}

// tools
impl RgDependencyGraph {
    #[inline]
    fn node(pass: RgPassId) -> NodeIndex {
        NodeIndex::new(pass.index())
    }

    fn neighbors(&self, pass: RgPassId, direction: Direction) -> Vec<RgPassId> {
        self.graph
            .neighbors_directed(Self::node(pass), direction)
            .map(|n| self.graph[n])
            .sorted()
            .dedup()
            .collect_vec()
    }

    pub(crate) fn add_dependency(&mut self, producer: RgPassId, consumer: RgPassId, dependency: RgDependency) {
        debug_assert!(producer < consumer, "dependency must follow submission order: {:?} -> {:?}", producer, consumer);
        self.graph.add_edge(Self::node(producer), Self::node(consumer), dependency);
    }

    /// 按提交顺序执行要求所有边都指向后面的 pass，因此图一定无环
    pub(crate) fn validate(&self) {
        if let Err(cycle) = petgraph::algo::toposort(&self.graph, None) {
            panic!("render graph dependency cycle at pass {:?}", self.graph[cycle.node_id()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors_dedup() {
        let mut graph = RgDependencyGraph::new(3);
        let raw = RgDependency {
            kind: RgDependencyKind::ReadAfterWrite,
            resource: RgResourceId(0),
        };
        graph.add_dependency(RgPassId(0), RgPassId(2), raw);
        graph.add_dependency(
            RgPassId(0),
            RgPassId(2),
            RgDependency {
                resource: RgResourceId(1),
                ..raw
            },
        );
        graph.add_dependency(RgPassId(1), RgPassId(2), raw);
        graph.validate();

        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.predecessors(RgPassId(2)), vec![RgPassId(0), RgPassId(1)]);
        assert_eq!(graph.successors(RgPassId(0)), vec![RgPassId(2)]);
        assert!(graph.has_dependency(RgPassId(1), RgPassId(2)));
        assert!(!graph.has_dependency(RgPassId(0), RgPassId(1)));
        assert_eq!(graph.edges().filter(|(p, _, _)| *p == RgPassId(0)).count(), 2);
    }
}
