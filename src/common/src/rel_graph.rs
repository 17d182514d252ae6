/// NodeIndex is used to identify nodes in a RelGraph.
pub type NodeIndex = usize;

/// An edge with its payload.
#[derive(Debug, Clone)]
struct GraphEdge<E> {
    source: NodeIndex,
    target: NodeIndex,
    data: E,
}

/// A small directed graph with node and edge payloads.
///
/// Nodes and edges are append-only; indices stay valid for the life of the
/// graph. Used for the foreign-key dependency graph, where edge payloads
/// carry relationship metadata.
#[derive(Debug, Clone)]
pub struct RelGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<GraphEdge<E>>,
    /// Outgoing edge indices per node.
    out_edges: Vec<Vec<usize>>,
    /// Incoming edge indices per node.
    in_edges: Vec<Vec<usize>>,
}

impl<N, E> Default for RelGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> RelGraph<N, E> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            out_edges: Vec::new(),
            in_edges: Vec::new(),
        }
    }

    /// Adds a node with associated data and returns its index.
    ///
    /// # Arguments
    ///
    /// * `data` - Payload to attach to the node.
    pub fn add_node(&mut self, data: N) -> NodeIndex {
        let index = self.nodes.len();
        self.nodes.push(data);
        self.out_edges.push(Vec::new());
        self.in_edges.push(Vec::new());
        index
    }

    /// Adds a directed edge from source to target.
    ///
    /// # Arguments
    ///
    /// * `source` - Tail of the edge.
    /// * `target` - Head of the edge.
    /// * `data` - Payload to attach to the edge.
    pub fn add_edge(&mut self, source: NodeIndex, target: NodeIndex, data: E) {
        let edge_index = self.edges.len();
        self.edges.push(GraphEdge {
            source,
            target,
            data,
        });
        self.out_edges[source].push(edge_index);
        self.in_edges[target].push(edge_index);
    }

    /// Returns the data associated with a node.
    ///
    /// # Arguments
    ///
    /// * `index` - Index of the node.
    pub fn node_data(&self, index: NodeIndex) -> Option<&N> {
        self.nodes.get(index)
    }

    /// Returns an iterator over `(target, edge data)` for every edge leaving
    /// `from`, in insertion order.
    ///
    /// # Arguments
    ///
    /// * `from` - Node to get the outgoing edges of.
    pub fn edges<'a>(&'a self, from: NodeIndex) -> impl Iterator<Item = (NodeIndex, &'a E)> + 'a {
        self.out_edges[from]
            .iter()
            .map(move |i| (self.edges[*i].target, &self.edges[*i].data))
    }

    /// Returns an iterator over `(source, edge data)` for every edge entering
    /// `to`, in insertion order.
    ///
    /// # Arguments
    ///
    /// * `to` - Node to get the incoming edges of.
    pub fn reverse_edges<'a>(
        &'a self,
        to: NodeIndex,
    ) -> impl Iterator<Item = (NodeIndex, &'a E)> + 'a {
        self.in_edges[to]
            .iter()
            .map(move |i| (self.edges[*i].source, &self.edges[*i].data))
    }

    /// Returns an iterator over all node indices.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        0..self.nodes.len()
    }

    /// Returns the total number of nodes present in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the total number of edges present in the graph.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
