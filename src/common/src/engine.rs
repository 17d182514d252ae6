use crate::heading::Heading;
use crate::{quote_ident, RelSqlError, SqlLiteral};
use std::error::Error;
use std::fmt;

/// Identifies a table, optionally qualified by a schema name.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
pub struct TableRef {
    /// Schema the table lives in, if qualified.
    pub schema: Option<String>,
    /// Table name.
    pub name: String,
}

impl TableRef {
    /// Creates an unqualified table reference.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the table.
    pub fn new(name: &str) -> Self {
        Self {
            schema: None,
            name: name.to_string(),
        }
    }

    /// Creates a schema-qualified table reference.
    ///
    /// # Arguments
    ///
    /// * `schema` - Name of the schema.
    /// * `name` - Name of the table.
    pub fn with_schema(schema: &str, name: &str) -> Self {
        Self {
            schema: Some(schema.to_string()),
            name: name.to_string(),
        }
    }

    /// The quoted, optionally schema-qualified SQL form.
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A foreign-key relationship between two tables.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct DependencyEdge {
    /// Referencing table.
    pub child: TableRef,
    /// Referenced table.
    pub parent: TableRef,
    /// True when the referencing columns all lie inside the child's primary
    /// key.
    #[serde(default)]
    pub is_primary: bool,
}

/// Classifies execution failures well enough for cascade handling. The error
/// is otherwise opaque to this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// A foreign-key constraint rejected the statement.
    ForeignKey,
    /// The connection failed.
    Connection,
    /// Anything else.
    Other,
}

/// Failure reported by the execution engine. Never retried here; retry
/// policy belongs to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecError {
    /// Failure classification.
    pub kind: ExecErrorKind,
    /// Engine-provided message.
    pub message: String,
}

impl ExecError {
    /// Creates an error of the given kind.
    ///
    /// # Arguments
    ///
    /// * `kind` - Failure classification.
    /// * `message` - Engine-provided message.
    pub fn new(kind: ExecErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }

    /// Creates a foreign-key conflict error.
    pub fn foreign_key(message: &str) -> Self {
        Self::new(ExecErrorKind::ForeignKey, message)
    }

    /// Creates an unclassified error.
    pub fn other(message: &str) -> Self {
        Self::new(ExecErrorKind::Other, message)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ExecError {}

/// One row of values from the execution engine.
pub type Row = Vec<SqlLiteral>;

/// The execution collaborator: runs compiled statements and provides the
/// transaction boundary. All statements issued between `begin_transaction`
/// and `commit` or `rollback` must be atomic.
pub trait ExecutionEngine {
    /// Executes a statement with bound parameters and returns result rows.
    ///
    /// # Arguments
    ///
    /// * `sql` - SQL text with `?` placeholders.
    /// * `params` - Bound parameters in placeholder order.
    fn execute(&self, sql: &str, params: &[SqlLiteral]) -> Result<Vec<Row>, ExecError>;

    /// Opens a transaction.
    fn begin_transaction(&self) -> Result<(), ExecError>;

    /// Commits the open transaction.
    fn commit(&self) -> Result<(), ExecError>;

    /// Rolls back the open transaction.
    fn rollback(&self) -> Result<(), ExecError>;
}

/// The metadata collaborator: supplies base-relation headings and the
/// foreign-key edges the dependency graph is built from.
pub trait MetadataSource {
    /// Returns the heading of a base relation.
    ///
    /// # Arguments
    ///
    /// * `table` - Table to describe.
    fn describe_table(&self, table: &TableRef) -> Result<Heading, RelSqlError>;

    /// Lists every foreign-key edge in the schema.
    ///
    /// # Arguments
    ///
    /// * `schema` - Schema to enumerate.
    fn list_foreign_keys(&self, schema: &str) -> Result<Vec<DependencyEdge>, RelSqlError>;
}
