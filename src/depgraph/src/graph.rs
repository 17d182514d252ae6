use common::engine::{MetadataSource, TableRef};
use common::rel_graph::{NodeIndex, RelGraph};
use common::RelSqlError;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed graph of foreign-key edges between relations.
///
/// Edges point from parent (referenced) to child (referencing) table, so
/// descendants of a table are the tables that depend on it. The graph is
/// built once from the metadata collaborator and mutated only by an explicit
/// reload; staleness after a DDL change is the caller's responsibility.
pub struct DependencyGraph {
    graph: RelGraph<TableRef, bool>,
    index: HashMap<TableRef, NodeIndex>,
    loaded: bool,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    /// Creates an empty, unloaded graph.
    pub fn new() -> Self {
        Self {
            graph: RelGraph::new(),
            index: HashMap::new(),
            loaded: false,
        }
    }

    /// Rebuilds all edges from the metadata collaborator. Idempotent and
    /// safe to call repeatedly; each call replaces the previous edges.
    ///
    /// # Arguments
    ///
    /// * `source` - Metadata collaborator.
    /// * `schema` - Schema to enumerate; empty for all.
    pub fn load<M: MetadataSource>(
        &mut self,
        source: &M,
        schema: &str,
    ) -> Result<(), RelSqlError> {
        let edges = source.list_foreign_keys(schema)?;
        let mut graph = RelGraph::new();
        let mut index = HashMap::new();
        for edge in &edges {
            let parent = Self::intern(&mut graph, &mut index, &edge.parent);
            let child = Self::intern(&mut graph, &mut index, &edge.child);
            graph.add_edge(parent, child, edge.is_primary);
        }
        info!(
            "loaded {} foreign-key edges over {} tables",
            graph.edge_count(),
            graph.node_count()
        );
        self.graph = graph;
        self.index = index;
        self.loaded = true;
        Ok(())
    }

    fn intern(
        graph: &mut RelGraph<TableRef, bool>,
        index: &mut HashMap<TableRef, NodeIndex>,
        table: &TableRef,
    ) -> NodeIndex {
        match index.get(table) {
            Some(i) => *i,
            None => {
                let i = graph.add_node(table.clone());
                index.insert(table.clone(), i);
                i
            }
        }
    }

    /// True once `load` has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// True when the table appears in any foreign-key edge.
    ///
    /// # Arguments
    ///
    /// * `table` - Table to look for.
    pub fn contains(&self, table: &TableRef) -> bool {
        self.index.contains_key(table)
    }

    /// Tables referencing `table` through a foreign key.
    ///
    /// # Arguments
    ///
    /// * `table` - Referenced table.
    /// * `primary_only` - Only edges whose referencing columns lie in the
    ///   child's primary key.
    pub fn children(&self, table: &TableRef, primary_only: bool) -> Vec<TableRef> {
        self.neighbors(table, primary_only, false)
    }

    /// Tables `table` references through a foreign key.
    ///
    /// # Arguments
    ///
    /// * `table` - Referencing table.
    /// * `primary_only` - Only edges whose referencing columns lie in the
    ///   child's primary key.
    pub fn parents(&self, table: &TableRef, primary_only: bool) -> Vec<TableRef> {
        self.neighbors(table, primary_only, true)
    }

    fn neighbors(&self, table: &TableRef, primary_only: bool, reverse: bool) -> Vec<TableRef> {
        let index = match self.index.get(table) {
            Some(i) => *i,
            None => return Vec::new(),
        };
        let hits: Vec<NodeIndex> = if reverse {
            self.graph
                .reverse_edges(index)
                .filter(|(_, primary)| !primary_only || **primary)
                .map(|(i, _)| i)
                .collect()
        } else {
            self.graph
                .edges(index)
                .filter(|(_, primary)| !primary_only || **primary)
                .map(|(i, _)| i)
                .collect()
        };
        let mut tables = Vec::new();
        let mut seen = HashSet::new();
        for i in hits {
            if seen.insert(i) {
                if let Some(t) = self.graph.node_data(i) {
                    tables.push(t.clone());
                }
            }
        }
        tables
    }

    /// The table itself plus every table transitively reachable through
    /// child edges, in topological order: every parent occurs before each of
    /// its children. Deletion walks this list in reverse.
    ///
    /// # Arguments
    ///
    /// * `table` - Table to start from.
    pub fn descendants(&self, table: &TableRef) -> Vec<TableRef> {
        self.ordered_reach(table, false)
    }

    /// The table itself plus every table it transitively references, with
    /// every child occurring before each of its parents.
    ///
    /// # Arguments
    ///
    /// * `table` - Table to start from.
    pub fn ancestors(&self, table: &TableRef) -> Vec<TableRef> {
        self.ordered_reach(table, true)
    }

    fn ordered_reach(&self, table: &TableRef, reverse: bool) -> Vec<TableRef> {
        let start = match self.index.get(table) {
            Some(i) => *i,
            None => {
                debug!("table {} has no foreign-key edges", table);
                return vec![table.clone()];
            }
        };
        // Reachable set first.
        let mut reach = HashSet::new();
        reach.insert(start);
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for next in self.step(node, reverse) {
                if reach.insert(next) {
                    stack.push(next);
                }
            }
        }
        // Kahn's algorithm over the induced subgraph.
        let mut indegree: HashMap<NodeIndex, usize> = HashMap::new();
        for node in &reach {
            let incoming = self
                .step(*node, !reverse)
                .into_iter()
                .filter(|i| reach.contains(i))
                .count();
            indegree.insert(*node, incoming);
        }
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        queue.push_back(start);
        let mut ordered = Vec::with_capacity(reach.len());
        let mut emitted = HashSet::new();
        while let Some(node) = queue.pop_front() {
            if !emitted.insert(node) {
                continue;
            }
            ordered.push(node);
            for next in self.step(node, reverse) {
                if !reach.contains(&next) || emitted.contains(&next) {
                    continue;
                }
                let remaining = indegree.get_mut(&next).expect("reachable node is counted");
                *remaining -= 1;
                if *remaining == 0 {
                    queue.push_back(next);
                }
            }
        }
        if ordered.len() < reach.len() {
            warn!(
                "foreign-key graph has a cycle through {}; ordering the remainder arbitrarily",
                table
            );
            let mut rest: Vec<NodeIndex> = reach
                .into_iter()
                .filter(|i| !emitted.contains(i))
                .collect();
            rest.sort_unstable();
            ordered.extend(rest);
        }
        ordered
            .into_iter()
            .filter_map(|i| self.graph.node_data(i).cloned())
            .collect()
    }

    /// Distinct successors (or predecessors) of a node, in edge order.
    fn step(&self, node: NodeIndex, reverse: bool) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        if reverse {
            for (i, _) in self.graph.reverse_edges(node) {
                if seen.insert(i) {
                    out.push(i);
                }
            }
        } else {
            for (i, _) in self.graph.edges(node) {
                if seen.insert(i) {
                    out.push(i);
                }
            }
        }
        out
    }
}
