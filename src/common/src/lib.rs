#[macro_use]
extern crate serde;
extern crate log;

use std::error::Error;
use std::fmt;

pub mod condition;
pub mod engine;
pub mod heading;
pub mod plan;
pub mod query;
pub mod rel_graph;
pub mod testutil;

pub use condition::{Condition, Restriction};
pub use engine::{
    DependencyEdge, ExecError, ExecErrorKind, ExecutionEngine, MetadataSource, Row, TableRef,
};
pub use heading::{Attribute, Heading};
pub use query::{NodeRef, QueryNode};

/// Custom error type.
#[derive(Debug, Clone, PartialEq)]
pub enum RelSqlError {
    /// An attribute was referenced that the heading does not contain.
    UnknownAttributeError(String),
    /// An attribute name collision after a rename or extension.
    DuplicateAttributeError(String),
    /// Union or join operands with incompatible headings.
    IncompatibleHeadingError(String),
    /// A relation joined with itself by identity.
    SelfJoinError(String),
    /// A cascade hit a live foreign key outside the descendant set.
    ForeignKeyConflictError(String),
    /// Structural validation errors.
    ValidationError(String),
    /// Failure reported by the execution engine.
    ExecutionError(ExecError),
}

impl fmt::Display for RelSqlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RelSqlError::UnknownAttributeError(s) => format!("Unknown Attribute: {}", s),
                RelSqlError::DuplicateAttributeError(s) => format!("Duplicate Attribute: {}", s),
                RelSqlError::IncompatibleHeadingError(s) => format!("Incompatible Heading: {}", s),
                RelSqlError::SelfJoinError(s) => format!("Self Join: {}", s),
                RelSqlError::ForeignKeyConflictError(s) => format!("Foreign Key Conflict: {}", s),
                RelSqlError::ValidationError(s) => format!("Validation Error: {}", s),
                RelSqlError::ExecutionError(e) => format!("Execution Error: {}", e),
            }
        )
    }
}

impl From<ExecError> for RelSqlError {
    fn from(error: ExecError) -> Self {
        RelSqlError::ExecutionError(error)
    }
}

impl Error for RelSqlError {}

/// Enumerate the supported column types.
#[derive(PartialEq, Serialize, Deserialize, Clone, Debug)]
pub enum SqlType {
    Int,
    BigInt,
    Double,
    Bool,
    Varchar(usize),
    Text,
    DateTime,
    Blob,
    /// Type of a computed column, unknown until the engine evaluates it.
    Unknown,
}

impl SqlType {
    /// Returns true for types stored as opaque byte strings.
    pub fn is_blob(&self) -> bool {
        match self {
            SqlType::Blob => true,
            _ => false,
        }
    }
}

/// A literal value, used for condition operands and bound parameters.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum SqlLiteral {
    Int(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Null,
}

impl fmt::Display for SqlLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlLiteral::Int(x) => write!(f, "{}", x),
            SqlLiteral::Double(x) => write!(f, "{}", x),
            SqlLiteral::Str(x) => write!(f, "{}", x),
            SqlLiteral::Bool(x) => write!(f, "{}", x),
            SqlLiteral::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            SqlLiteral::Null => write!(f, "NULL"),
        }
    }
}

/// Return type for a compiled statement: the SQL text plus the bound
/// parameters in placeholder order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CompiledQuery {
    /// The SQL text with `?` placeholders.
    pub sql: String,
    /// Bound parameter values, one per placeholder, in order.
    pub params: Vec<SqlLiteral>,
}

impl CompiledQuery {
    /// Create a compiled statement.
    ///
    /// # Arguments
    ///
    /// * `sql` - SQL text.
    /// * `params` - Bound parameters in placeholder order.
    pub fn new(sql: String, params: Vec<SqlLiteral>) -> Self {
        Self { sql, params }
    }
}

/// Quotes an identifier for the target dialect.
///
/// # Arguments
///
/// * `name` - Identifier to quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("a"), "\"a\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_error_display() {
        let e = RelSqlError::UnknownAttributeError(String::from("x"));
        assert_eq!(format!("{}", e), "Unknown Attribute: x");
    }

    #[test]
    fn test_blob_type() {
        assert!(SqlType::Blob.is_blob());
        assert!(!SqlType::Int.is_blob());
        assert!(!SqlType::Varchar(64).is_blob());
    }
}
