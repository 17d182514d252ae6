use crate::engine::{ExecError, ExecErrorKind, ExecutionEngine, Row, TableRef};
use crate::heading::{Attribute, Heading};
use crate::query::{NodeRef, QueryNode};
use crate::{SqlLiteral, SqlType};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::cell::{Cell, RefCell};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a heading of integer attributes with the given key split.
///
/// # Arguments
///
/// * `keys` - Names of the key attributes.
/// * `secondary` - Names of the secondary attributes.
pub fn int_heading(keys: &[&str], secondary: &[&str]) -> Heading {
    let mut attrs = Vec::new();
    for name in keys {
        attrs.push(Attribute::key((*name).to_string(), SqlType::Int));
    }
    for name in secondary {
        attrs.push(Attribute::new((*name).to_string(), SqlType::Int));
    }
    Heading::new(attrs).expect("test heading should be valid")
}

/// Creates a base node over a table of integer attributes.
///
/// # Arguments
///
/// * `name` - Table name.
/// * `keys` - Names of the key attributes.
/// * `secondary` - Names of the secondary attributes.
pub fn int_base(name: &str, keys: &[&str], secondary: &[&str]) -> NodeRef {
    QueryNode::base(TableRef::new(name), int_heading(keys, secondary))
        .expect("test base node should be valid")
}

pub fn gen_rand_string(n: usize) -> String {
    thread_rng()
        .sample_iter(Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

/// Generates a row of random integer literals.
pub fn gen_rand_int_row(width: usize) -> Row {
    let mut rng = thread_rng();
    (0..width)
        .map(|_| SqlLiteral::Int(rng.gen_range(0..1000)))
        .collect()
}

/// A scripted execution engine for tests. Records every statement and
/// transaction call, and can be told to fail the nth execute with a chosen
/// error kind.
pub struct MockEngine {
    /// Executed statements with their parameters, in order.
    pub executed: RefCell<Vec<(String, Vec<SqlLiteral>)>>,
    /// Number of begin_transaction calls.
    pub begins: Cell<u32>,
    /// Number of commit calls.
    pub commits: Cell<u32>,
    /// Number of rollback calls.
    pub rollbacks: Cell<u32>,
    fail_at: Cell<Option<usize>>,
    fail_kind: Cell<ExecErrorKind>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Creates an engine that accepts every statement.
    pub fn new() -> Self {
        Self {
            executed: RefCell::new(Vec::new()),
            begins: Cell::new(0),
            commits: Cell::new(0),
            rollbacks: Cell::new(0),
            fail_at: Cell::new(None),
            fail_kind: Cell::new(ExecErrorKind::Other),
        }
    }

    /// Makes the engine fail the statement at `index` (0-based over execute
    /// calls) with the given error kind.
    ///
    /// # Arguments
    ///
    /// * `index` - Execute call to fail.
    /// * `kind` - Error kind to report.
    pub fn fail_at(&self, index: usize, kind: ExecErrorKind) {
        self.fail_at.set(Some(index));
        self.fail_kind.set(kind);
    }

    /// The SQL texts executed so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.executed
            .borrow()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }
}

impl ExecutionEngine for MockEngine {
    fn execute(&self, sql: &str, params: &[SqlLiteral]) -> Result<Vec<Row>, ExecError> {
        let index = self.executed.borrow().len();
        if self.fail_at.get() == Some(index) {
            return Err(ExecError::new(
                self.fail_kind.get(),
                &format!("scripted failure at statement {}", index),
            ));
        }
        self.executed
            .borrow_mut()
            .push((sql.to_string(), params.to_vec()));
        Ok(Vec::new())
    }

    fn begin_transaction(&self) -> Result<(), ExecError> {
        self.begins.set(self.begins.get() + 1);
        Ok(())
    }

    fn commit(&self) -> Result<(), ExecError> {
        self.commits.set(self.commits.get() + 1);
        Ok(())
    }

    fn rollback(&self) -> Result<(), ExecError> {
        self.rollbacks.set(self.rollbacks.get() + 1);
        Ok(())
    }
}
