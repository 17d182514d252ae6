use crate::heading::Heading;
use crate::query::NodeRef;
use crate::{RelSqlError, SqlLiteral};
use log::warn;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// A restriction argument as supplied by the caller.
///
/// Restrictions are heading-independent descriptions; `restrict` normalizes
/// them against the operand's heading into a [`Condition`].
#[derive(Debug, Clone)]
pub enum Restriction {
    /// Equality on each named attribute, combined with AND.
    ByMap(Vec<(String, SqlLiteral)>),
    /// Disjunction of equality maps. An empty list matches nothing.
    AnyOf(Vec<Vec<(String, SqlLiteral)>>),
    /// Semijoin: the tuple of shared attributes must appear in the other
    /// node's projection.
    ByNode(NodeRef),
    /// Negation of the inner restriction.
    Not(Box<Restriction>),
    /// Conjunction of restrictions.
    All(Vec<Restriction>),
    /// An opaque SQL boolean expression, passed through verbatim. Keeping
    /// attribute names identifier-safe is the caller's responsibility.
    Raw(String),
}

impl Restriction {
    /// Convenience constructor for a single-attribute equality.
    ///
    /// # Arguments
    ///
    /// * `name` - Attribute name.
    /// * `value` - Literal to compare against.
    pub fn eq(name: &str, value: SqlLiteral) -> Self {
        Restriction::ByMap(vec![(name.to_string(), value)])
    }

    /// Antijoin: rows whose shared attributes do not appear in the other
    /// node's projection.
    ///
    /// # Arguments
    ///
    /// * `node` - Node whose projection is excluded.
    pub fn not_in(node: NodeRef) -> Self {
        Restriction::Not(Box::new(Restriction::ByNode(node)))
    }
}

/// The normalized restriction model owned by a Restrict node.
///
/// A condition is always evaluated against one fixed heading; normalization
/// guarantees that every attribute it references exists in that heading.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Matches every row.
    True,
    /// Matches no row.
    False,
    /// Equality on each pair, combined with AND.
    Equals(Vec<(String, SqlLiteral)>),
    /// Conjunction.
    AndList(Vec<Condition>),
    /// Disjunction.
    OrList(Vec<Condition>),
    /// Membership of the shared attribute tuple in the node's projection.
    Membership { node: NodeRef, attrs: Vec<String> },
    /// Literal negation. Never simplified: double negation compiles to
    /// nested NOT (...) exactly as written.
    Not(Box<Condition>),
    /// Verbatim SQL boolean expression.
    Raw(String),
}

impl Condition {
    /// Normalize a caller restriction against a heading.
    ///
    /// Attributes absent from the heading are dropped from equality maps; a
    /// map (or a semijoin) with no attribute in common with the heading
    /// matches everything. An empty disjunction matches nothing.
    ///
    /// # Arguments
    ///
    /// * `restriction` - Caller-supplied restriction.
    /// * `heading` - Heading of the operand being restricted.
    pub fn normalize(restriction: &Restriction, heading: &Heading) -> Result<Self, RelSqlError> {
        match restriction {
            Restriction::ByMap(pairs) => Ok(Self::normalize_map(pairs, heading)),
            Restriction::AnyOf(maps) => {
                if maps.is_empty() {
                    return Ok(Condition::False);
                }
                let mut disjuncts = Vec::with_capacity(maps.len());
                for map in maps {
                    match Self::normalize_map(map, heading) {
                        // One universally true disjunct swallows the rest.
                        Condition::True => return Ok(Condition::True),
                        cond => disjuncts.push(cond),
                    }
                }
                Ok(Condition::OrList(disjuncts))
            }
            Restriction::ByNode(node) => {
                let attrs = heading.common_attrs(node.heading());
                if attrs.is_empty() {
                    return Ok(Condition::True);
                }
                Ok(Condition::Membership {
                    node: node.clone(),
                    attrs,
                })
            }
            Restriction::Not(inner) => {
                let cond = Self::normalize(inner, heading)?;
                Ok(Condition::Not(Box::new(cond)))
            }
            Restriction::All(items) => {
                let mut conds = Vec::with_capacity(items.len());
                for item in items {
                    conds.push(Self::normalize(item, heading)?);
                }
                Ok(Condition::AndList(conds))
            }
            Restriction::Raw(sql) => {
                Self::check_raw(sql);
                Ok(Condition::Raw(sql.clone()))
            }
        }
    }

    fn normalize_map(pairs: &[(String, SqlLiteral)], heading: &Heading) -> Condition {
        let present: Vec<(String, SqlLiteral)> = pairs
            .iter()
            .filter(|(name, _)| heading.contains(name))
            .cloned()
            .collect();
        if present.is_empty() {
            Condition::True
        } else {
            Condition::Equals(present)
        }
    }

    /// Parse-checks a raw predicate and logs on failure. Raw predicates are
    /// passed through verbatim either way.
    fn check_raw(sql: &str) {
        let probe = format!("SELECT * FROM \"t\" WHERE ({})", sql);
        if let Err(e) = Parser::parse_sql(&GenericDialect {}, &probe) {
            warn!("raw predicate {:?} did not parse: {}", sql, e);
        }
    }

    /// True when the condition matches every row, making the restriction a
    /// no-op.
    pub fn is_noop(&self) -> bool {
        match self {
            Condition::True => true,
            _ => false,
        }
    }

    /// Collects the attribute names the condition references directly.
    /// Raw predicates are opaque; see [`Condition::contains_raw`].
    pub fn referenced_attrs(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_attrs(&mut names);
        names
    }

    fn collect_attrs<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Condition::True | Condition::False | Condition::Raw(_) => (),
            Condition::Equals(pairs) => {
                for (name, _) in pairs {
                    names.push(name.as_str());
                }
            }
            Condition::AndList(conds) | Condition::OrList(conds) => {
                for cond in conds {
                    cond.collect_attrs(names);
                }
            }
            Condition::Membership { attrs, .. } => {
                for name in attrs {
                    names.push(name.as_str());
                }
            }
            Condition::Not(inner) => inner.collect_attrs(names),
        }
    }

    /// True when any part of the condition is a verbatim predicate whose
    /// attribute references cannot be inspected.
    pub fn contains_raw(&self) -> bool {
        match self {
            Condition::Raw(_) => true,
            Condition::True | Condition::False | Condition::Equals(_) => false,
            Condition::AndList(conds) | Condition::OrList(conds) => {
                conds.iter().any(|c| c.contains_raw())
            }
            Condition::Membership { .. } => false,
            Condition::Not(inner) => inner.contains_raw(),
        }
    }
}
