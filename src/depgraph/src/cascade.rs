use crate::graph::DependencyGraph;
use common::condition::Restriction;
use common::engine::{ExecErrorKind, ExecutionEngine, MetadataSource, TableRef};
use common::query::{NodeRef, QueryNode};
use common::RelSqlError;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A cascading-delete plan: one restricted node per affected relation, in
/// execution order (leaves first, the seed relation last).
pub struct CascadePlan {
    /// Delete targets in execution order.
    pub deletes: Vec<(TableRef, NodeRef)>,
}

/// Outcome of an executed cascade.
pub struct CascadeReport {
    /// Tables deleted from, in execution order.
    pub deleted: Vec<TableRef>,
}

/// Derives the cascading-delete plan for a seed restriction.
///
/// The seed must be a base relation or a restriction chain over one. Every
/// descendant is restricted by a semijoin against each of its restricted
/// in-set parents, so the seed restriction propagates transitively; a parent
/// with no restriction of its own passes the narrowing through unchanged.
///
/// # Arguments
///
/// * `graph` - Loaded dependency graph.
/// * `seed` - Node selecting the rows to delete from the seed relation.
/// * `source` - Metadata collaborator for descendant headings.
pub fn cascade_plan<M: MetadataSource>(
    graph: &DependencyGraph,
    seed: &NodeRef,
    source: &M,
) -> Result<CascadePlan, RelSqlError> {
    let table = seed.base_table().cloned().ok_or_else(|| {
        RelSqlError::ValidationError(String::from(
            "cascade seed must be a base relation or a restriction over one",
        ))
    })?;
    if !graph.is_loaded() {
        warn!("dependency graph not loaded; cascading from {} alone", table);
    }
    let order = graph.descendants(&table);
    let in_set: HashSet<TableRef> = order.iter().cloned().collect();
    let mut nodes: HashMap<TableRef, NodeRef> = HashMap::new();
    nodes.insert(table.clone(), seed.clone());
    for target in order.iter().skip(1) {
        let heading = source.describe_table(target)?;
        let mut node = QueryNode::base(target.clone(), heading)?;
        for parent in graph.parents(target, false) {
            if !in_set.contains(&parent) {
                continue;
            }
            let parent_node = match nodes.get(&parent) {
                Some(n) => n.clone(),
                None => continue,
            };
            let restricted =
                QueryNode::restrict(&node, Restriction::ByNode(parent_node))?;
            if Arc::ptr_eq(&restricted, &node) {
                warn!(
                    "{} shares no attributes with {}; cascade does not narrow it",
                    target, parent
                );
            }
            node = restricted;
        }
        nodes.insert(target.clone(), node);
    }
    let mut deletes = Vec::with_capacity(order.len());
    for target in order.iter().rev() {
        let node = nodes
            .get(target)
            .cloned()
            .ok_or_else(|| RelSqlError::ValidationError(format!("no plan node for {}", target)))?;
        deletes.push((target.clone(), node));
    }
    Ok(CascadePlan { deletes })
}

/// Executes a cascade plan inside one transaction.
///
/// All per-relation deletes run between one begin and one commit; any
/// failure rolls the transaction back so no partial progress is ever
/// committed. A failure the engine classifies as a foreign-key conflict
/// surfaces as `ForeignKeyConflictError`; everything else is propagated as
/// the engine's own error.
///
/// # Arguments
///
/// * `plan` - Plan from [`cascade_plan`].
/// * `engine` - Execution collaborator owning the connection.
pub fn execute_cascade<E: ExecutionEngine>(
    plan: &CascadePlan,
    engine: &E,
) -> Result<CascadeReport, RelSqlError> {
    engine.begin_transaction()?;
    let mut deleted = Vec::with_capacity(plan.deletes.len());
    for (table, node) in &plan.deletes {
        let compiled = match sqlgen::build_delete(node) {
            Ok(compiled) => compiled,
            Err(e) => {
                let _ = engine.rollback();
                return Err(e);
            }
        };
        debug!("cascade delete {}: {}", table, compiled.sql);
        if let Err(e) = engine.execute(&compiled.sql, &compiled.params) {
            let _ = engine.rollback();
            return Err(match e.kind {
                ExecErrorKind::ForeignKey => RelSqlError::ForeignKeyConflictError(format!(
                    "delete from {} hit a live foreign key: {}",
                    table, e.message
                )),
                _ => RelSqlError::ExecutionError(e),
            });
        }
        deleted.push(table.clone());
    }
    if let Err(e) = engine.commit() {
        let _ = engine.rollback();
        return Err(RelSqlError::ExecutionError(e));
    }
    Ok(CascadeReport { deleted })
}
