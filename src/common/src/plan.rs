use crate::condition::Restriction;
use crate::engine::{DependencyEdge, MetadataSource, TableRef};
use crate::heading::Heading;
use crate::query::{NodeRef, QueryNode};
use crate::{RelSqlError, SqlLiteral};
use std::collections::HashMap;

/// A serializable description of a query-expression tree.
///
/// Operators reference their operands by index into `ops`; an operator may
/// only reference operators defined before it. Lowering goes through the
/// real constructors against a catalog, so a deserialized plan passes every
/// construction-time check a hand-built tree would.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlanDoc {
    /// Operators in definition order.
    pub ops: Vec<OpDoc>,
    /// Index of the operator producing the final result.
    pub root: usize,
}

/// One operator of a plan description.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum OpDoc {
    Base(BaseDoc),
    Universal,
    Restrict(RestrictDoc),
    Project(ProjectDoc),
    Join(JoinDoc),
    Aggregate(AggregateDoc),
    Union(UnionDoc),
}

/// Base relation operator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BaseDoc {
    /// Table the node selects from.
    pub table: TableRef,
}

/// Restriction operator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RestrictDoc {
    /// Index of the operand.
    pub input: usize,
    /// Restriction to apply.
    pub restriction: RestrictionDoc,
}

/// Projection operator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProjectDoc {
    /// Index of the operand.
    pub input: usize,
    /// Secondary attributes to keep.
    #[serde(default)]
    pub keep: Vec<String>,
    /// Pairs of (new name, old name).
    #[serde(default)]
    pub rename: Vec<(String, String)>,
    /// Pairs of (new name, SQL expression).
    #[serde(default)]
    pub extend: Vec<(String, String)>,
    /// Result attributes to promote into the key.
    #[serde(default)]
    pub force_key: Vec<String>,
}

/// Natural-join operator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JoinDoc {
    /// Index of the left operand.
    pub left: usize,
    /// Index of the right operand.
    pub right: usize,
}

/// Aggregation operator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AggregateDoc {
    /// Index of the node whose rows are aggregated.
    pub input: usize,
    /// Index of the node supplying the grouping key.
    pub grouping: usize,
    /// Pairs of (name, aggregate SQL expression).
    #[serde(default)]
    pub extend: Vec<(String, String)>,
    /// Keep grouping rows without matching operand rows.
    #[serde(default)]
    pub keep_unmatched: bool,
}

/// Union operator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UnionDoc {
    /// Index of the left operand.
    pub left: usize,
    /// Index of the right operand.
    pub right: usize,
}

/// Serializable restriction, with node references by operator index.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum RestrictionDoc {
    ByMap(Vec<(String, SqlLiteral)>),
    AnyOf(Vec<Vec<(String, SqlLiteral)>>),
    ByNode(usize),
    Not(Box<RestrictionDoc>),
    All(Vec<RestrictionDoc>),
    Raw(String),
}

impl RestrictionDoc {
    /// Lowers the document into a [`Restriction`], resolving node references
    /// against operators already built.
    fn lower(&self, nodes: &[NodeRef], at: usize) -> Result<Restriction, RelSqlError> {
        Ok(match self {
            RestrictionDoc::ByMap(pairs) => Restriction::ByMap(pairs.clone()),
            RestrictionDoc::AnyOf(maps) => Restriction::AnyOf(maps.clone()),
            RestrictionDoc::ByNode(index) => Restriction::ByNode(PlanDoc::input(nodes, *index, at)?),
            RestrictionDoc::Not(inner) => Restriction::Not(Box::new(inner.lower(nodes, at)?)),
            RestrictionDoc::All(items) => {
                let mut lowered = Vec::with_capacity(items.len());
                for item in items {
                    lowered.push(item.lower(nodes, at)?);
                }
                Restriction::All(lowered)
            }
            RestrictionDoc::Raw(sql) => Restriction::Raw(sql.clone()),
        })
    }
}

impl PlanDoc {
    /// De-serializes a json representation of a plan.
    ///
    /// # Arguments
    ///
    /// * `json` - JSON text to parse.
    pub fn from_json(json: &str) -> Result<Self, RelSqlError> {
        serde_json::from_str(json)
            .map_err(|e| RelSqlError::ValidationError(format!("malformatted plan json: {}", e)))
    }

    /// Serializes the plan as json.
    pub fn to_json(&self) -> Result<String, RelSqlError> {
        serde_json::to_string(self)
            .map_err(|e| RelSqlError::ValidationError(format!("plan serialization failed: {}", e)))
    }

    fn input(nodes: &[NodeRef], index: usize, at: usize) -> Result<NodeRef, RelSqlError> {
        if index >= at {
            return Err(RelSqlError::ValidationError(format!(
                "op {} references op {} before it is defined",
                at, index
            )));
        }
        Ok(nodes[index].clone())
    }

    /// Builds the query tree through the validating constructors.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Metadata source for base-relation headings.
    pub fn build<M: MetadataSource>(&self, catalog: &M) -> Result<NodeRef, RelSqlError> {
        let mut nodes: Vec<NodeRef> = Vec::with_capacity(self.ops.len());
        for (i, op) in self.ops.iter().enumerate() {
            let node = match op {
                OpDoc::Base(doc) => {
                    let heading = catalog.describe_table(&doc.table)?;
                    QueryNode::base(doc.table.clone(), heading)?
                }
                OpDoc::Universal => QueryNode::universal(),
                OpDoc::Restrict(doc) => {
                    let operand = Self::input(&nodes, doc.input, i)?;
                    let restriction = doc.restriction.lower(&nodes, i)?;
                    QueryNode::restrict(&operand, restriction)?
                }
                OpDoc::Project(doc) => {
                    let operand = Self::input(&nodes, doc.input, i)?;
                    let keep: Vec<&str> = doc.keep.iter().map(String::as_str).collect();
                    let rename: Vec<(&str, &str)> = doc
                        .rename
                        .iter()
                        .map(|(n, o)| (n.as_str(), o.as_str()))
                        .collect();
                    let extend: Vec<(&str, &str)> = doc
                        .extend
                        .iter()
                        .map(|(n, e)| (n.as_str(), e.as_str()))
                        .collect();
                    let force_key: Vec<&str> = doc.force_key.iter().map(String::as_str).collect();
                    QueryNode::project(&operand, &keep, &rename, &extend, &force_key)?
                }
                OpDoc::Join(doc) => {
                    let left = Self::input(&nodes, doc.left, i)?;
                    let right = Self::input(&nodes, doc.right, i)?;
                    QueryNode::join(&left, &right)?
                }
                OpDoc::Aggregate(doc) => {
                    let operand = Self::input(&nodes, doc.input, i)?;
                    let grouping = Self::input(&nodes, doc.grouping, i)?;
                    let extend: Vec<(&str, &str)> = doc
                        .extend
                        .iter()
                        .map(|(n, e)| (n.as_str(), e.as_str()))
                        .collect();
                    QueryNode::aggregate(&operand, &grouping, &extend, doc.keep_unmatched)?
                }
                OpDoc::Union(doc) => {
                    let left = Self::input(&nodes, doc.left, i)?;
                    let right = Self::input(&nodes, doc.right, i)?;
                    QueryNode::union(&left, &right)?
                }
            };
            nodes.push(node);
        }
        nodes
            .get(self.root)
            .cloned()
            .ok_or_else(|| RelSqlError::ValidationError(format!("root {} out of range", self.root)))
    }
}

/// An in-memory metadata source, deserializable from a JSON catalog
/// document. Backs the command-line compiler and tests.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SimpleCatalog {
    /// Headings by table name (schema-qualified as `schema.table` when
    /// applicable).
    pub tables: HashMap<String, Heading>,
    /// All declared foreign-key edges.
    #[serde(default)]
    pub foreign_keys: Vec<DependencyEdge>,
}

impl SimpleCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// De-serializes a json representation of a catalog.
    ///
    /// # Arguments
    ///
    /// * `json` - JSON text to parse.
    pub fn from_json(json: &str) -> Result<Self, RelSqlError> {
        serde_json::from_str(json)
            .map_err(|e| RelSqlError::ValidationError(format!("malformatted catalog json: {}", e)))
    }

    /// Registers a table.
    ///
    /// # Arguments
    ///
    /// * `table` - Table reference.
    /// * `heading` - Heading of the table.
    pub fn add_table(&mut self, table: &TableRef, heading: Heading) {
        self.tables.insert(table.to_string(), heading);
    }

    /// Registers a foreign-key edge.
    ///
    /// # Arguments
    ///
    /// * `edge` - Edge to add.
    pub fn add_foreign_key(&mut self, edge: DependencyEdge) {
        self.foreign_keys.push(edge);
    }
}

impl MetadataSource for SimpleCatalog {
    fn describe_table(&self, table: &TableRef) -> Result<Heading, RelSqlError> {
        self.tables.get(&table.to_string()).cloned().ok_or_else(|| {
            RelSqlError::ValidationError(format!("table {} not found in catalog", table))
        })
    }

    fn list_foreign_keys(&self, schema: &str) -> Result<Vec<DependencyEdge>, RelSqlError> {
        if schema.is_empty() {
            return Ok(self.foreign_keys.clone());
        }
        Ok(self
            .foreign_keys
            .iter()
            .filter(|e| e.child.schema.as_deref() == Some(schema))
            .cloned()
            .collect())
    }
}
