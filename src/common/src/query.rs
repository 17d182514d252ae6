use crate::condition::{Condition, Restriction};
use crate::engine::TableRef;
use crate::heading::Heading;
use crate::RelSqlError;
use std::collections::HashSet;
use std::sync::Arc;

/// Shared handle to a query node. Operands are reference counted so one tree
/// can be an operand of many derived queries.
pub type NodeRef = Arc<QueryNode>;

/// A node of the query-expression tree.
///
/// Nodes are immutable: every operator application returns a new node
/// wrapping the previous tree, so trees are persistent and safe to share
/// across threads. Each node owns its heading, computed once at
/// construction.
#[derive(Debug)]
pub enum QueryNode {
    /// A named relation in the database.
    Base {
        /// Table the node selects from.
        table: TableRef,
        /// Heading from base-relation introspection.
        heading: Heading,
    },
    /// Restriction of the operand's rows. The heading is unchanged.
    Restrict {
        /// Node being restricted.
        operand: NodeRef,
        /// Normalized condition, validated against the operand's heading.
        condition: Condition,
    },
    /// Projection, rename and extension over the operand.
    Project {
        /// Node being projected.
        operand: NodeRef,
        /// Derived heading.
        heading: Heading,
    },
    /// Natural join of two operands.
    Join {
        /// Left operand.
        left: NodeRef,
        /// Right operand.
        right: NodeRef,
        /// Derived heading.
        heading: Heading,
    },
    /// Aggregation of `operand` grouped by `grouping`'s primary key.
    Aggregate {
        /// Node whose rows are aggregated.
        operand: NodeRef,
        /// Node supplying the grouping key.
        grouping: NodeRef,
        /// Computed columns: pairs of (name, aggregate SQL expression).
        extend: Vec<(String, String)>,
        /// Keep grouping rows with no matching operand rows (left join).
        keep_unmatched: bool,
        /// Derived heading.
        heading: Heading,
    },
    /// Union with distinct-row semantics.
    Union {
        /// Left operand.
        left: NodeRef,
        /// Right operand.
        right: NodeRef,
        /// Derived heading.
        heading: Heading,
    },
}

impl QueryNode {
    /// The heading of the relation value this node produces.
    pub fn heading(&self) -> &Heading {
        match self {
            QueryNode::Base { heading, .. }
            | QueryNode::Project { heading, .. }
            | QueryNode::Join { heading, .. }
            | QueryNode::Aggregate { heading, .. }
            | QueryNode::Union { heading, .. } => heading,
            QueryNode::Restrict { operand, .. } => operand.heading(),
        }
    }

    /// The base table this node narrows, if the node is a base relation or a
    /// restriction chain over one.
    pub fn base_table(&self) -> Option<&TableRef> {
        match self {
            QueryNode::Base { table, .. } => Some(table),
            QueryNode::Restrict { operand, .. } => operand.base_table(),
            _ => None,
        }
    }

    /// Create a base node for a named relation.
    ///
    /// # Arguments
    ///
    /// * `table` - Table the node selects from.
    /// * `heading` - Heading from base-relation introspection.
    pub fn base(table: TableRef, heading: Heading) -> Result<NodeRef, RelSqlError> {
        if heading.has_unresolved() {
            return Err(RelSqlError::ValidationError(format!(
                "base relation {} has computed attributes",
                table
            )));
        }
        Ok(Arc::new(QueryNode::Base { table, heading }))
    }

    /// The degenerate relation with the universal (zero-attribute) heading.
    /// Used as the grouping operand to aggregate all rows into one group;
    /// the compiler never renders it as a FROM source.
    pub fn universal() -> NodeRef {
        Arc::new(QueryNode::Base {
            table: TableRef::new("universal"),
            heading: Heading::universal(),
        })
    }

    /// Restrict the operand's rows.
    ///
    /// The restriction is normalized against the operand's heading; a
    /// restriction that matches everything returns the operand unchanged.
    /// Restricting an already restricted node merges the conditions by
    /// conjunction, so chained restrictions compose like a single AND list.
    ///
    /// # Arguments
    ///
    /// * `operand` - Node to restrict.
    /// * `restriction` - Caller-supplied restriction.
    pub fn restrict(operand: &NodeRef, restriction: Restriction) -> Result<NodeRef, RelSqlError> {
        let condition = Condition::normalize(&restriction, operand.heading())?;
        if condition.is_noop() {
            return Ok(operand.clone());
        }
        match &**operand {
            QueryNode::Restrict {
                operand: inner,
                condition: existing,
            } => {
                let merged = match existing.clone() {
                    Condition::AndList(mut conds) => {
                        conds.push(condition);
                        Condition::AndList(conds)
                    }
                    other => Condition::AndList(vec![other, condition]),
                };
                Ok(Arc::new(QueryNode::Restrict {
                    operand: inner.clone(),
                    condition: merged,
                }))
            }
            _ => Ok(Arc::new(QueryNode::Restrict {
                operand: operand.clone(),
                condition,
            })),
        }
    }

    /// Project, rename and extend the operand.
    ///
    /// # Arguments
    ///
    /// * `operand` - Node to project.
    /// * `keep` - Secondary attribute names to keep.
    /// * `rename` - Pairs of (new name, old name).
    /// * `extend` - Pairs of (new name, SQL expression).
    /// * `force_key` - Result attribute names to promote into the key.
    pub fn project(
        operand: &NodeRef,
        keep: &[&str],
        rename: &[(&str, &str)],
        extend: &[(&str, &str)],
        force_key: &[&str],
    ) -> Result<NodeRef, RelSqlError> {
        let heading = operand.heading().project(keep, rename, extend, force_key)?;
        Ok(Arc::new(QueryNode::Project {
            operand: operand.clone(),
            heading,
        }))
    }

    /// Natural join of two operands.
    ///
    /// Joining a node with itself by identity is rejected; share a base
    /// table through two distinct projections instead.
    ///
    /// # Arguments
    ///
    /// * `left` - Left operand.
    /// * `right` - Right operand.
    pub fn join(left: &NodeRef, right: &NodeRef) -> Result<NodeRef, RelSqlError> {
        if Arc::ptr_eq(left, right) {
            return Err(RelSqlError::SelfJoinError(String::from(
                "operands are the same node",
            )));
        }
        let heading = left.heading().join(right.heading(), false)?;
        Ok(Arc::new(QueryNode::Join {
            left: left.clone(),
            right: right.clone(),
            heading,
        }))
    }

    /// Aggregate `operand` grouped by `grouping`'s primary key.
    ///
    /// The result heading is the grouping heading plus the extend attributes
    /// as computed secondary columns. Grouping by the universal heading
    /// aggregates all rows into one.
    ///
    /// # Arguments
    ///
    /// * `operand` - Node whose rows are aggregated.
    /// * `grouping` - Node supplying the grouping key.
    /// * `extend` - Pairs of (name, aggregate SQL expression).
    /// * `keep_unmatched` - Keep grouping rows without matching operand rows.
    pub fn aggregate(
        operand: &NodeRef,
        grouping: &NodeRef,
        extend: &[(&str, &str)],
        keep_unmatched: bool,
    ) -> Result<NodeRef, RelSqlError> {
        let resolved = grouping.heading().resolve_expressions();
        let secondary = resolved.secondary();
        let heading = resolved.project(&secondary, &[], extend, &[])?;
        Ok(Arc::new(QueryNode::Aggregate {
            operand: operand.clone(),
            grouping: grouping.clone(),
            extend: extend
                .iter()
                .map(|(name, expr)| ((*name).to_string(), (*expr).to_string()))
                .collect(),
            keep_unmatched,
            heading,
        }))
    }

    /// Union of two operands with identical attribute name sets. Compiles
    /// with distinct-row semantics.
    ///
    /// # Arguments
    ///
    /// * `left` - Left operand.
    /// * `right` - Right operand.
    pub fn union(left: &NodeRef, right: &NodeRef) -> Result<NodeRef, RelSqlError> {
        let left_names: HashSet<&str> = left.heading().names().into_iter().collect();
        let right_names: HashSet<&str> = right.heading().names().into_iter().collect();
        if left_names != right_names {
            return Err(RelSqlError::IncompatibleHeadingError(format!(
                "union operands have attribute sets {:?} and {:?}",
                left.heading().names(),
                right.heading().names()
            )));
        }
        let heading = left.heading().resolve_expressions();
        Ok(Arc::new(QueryNode::Union {
            left: left.clone(),
            right: right.clone(),
            heading,
        }))
    }
}
