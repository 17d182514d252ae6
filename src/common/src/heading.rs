use crate::{quote_ident, RelSqlError, SqlLiteral, SqlType};
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};

/// Handle attributes. Pairs the name with the column type plus the
/// relational metadata the operators need.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name, unique within a heading.
    pub name: String,
    /// Attribute column type.
    pub sql_type: SqlType,
    /// Whether the attribute is part of the primary key.
    #[serde(default)]
    pub in_key: bool,
    /// Whether the column admits NULL.
    #[serde(default)]
    pub nullable: bool,
    /// Declared default value, if any.
    #[serde(default)]
    pub default: Option<SqlLiteral>,
    /// Whether the column is stored as an opaque byte string.
    #[serde(default)]
    pub is_blob: bool,
    /// SQL expression for a computed or renamed column. A set expression
    /// means the column does not yet exist under this name in the underlying
    /// FROM clause and must be materialized by a subquery before an
    /// enclosing clause may reference it.
    #[serde(default)]
    pub expression: Option<String>,
}

impl Attribute {
    /// Create a new secondary attribute with the given name and type.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the attribute.
    /// * `sql_type` - Column type of the attribute.
    pub fn new(name: String, sql_type: SqlType) -> Self {
        let is_blob = sql_type.is_blob();
        Self {
            name,
            sql_type,
            in_key: false,
            nullable: false,
            default: None,
            is_blob,
            expression: None,
        }
    }

    /// Create a new primary-key attribute with the given name and type.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the attribute.
    /// * `sql_type` - Column type of the attribute.
    pub fn key(name: String, sql_type: SqlType) -> Self {
        let mut attr = Attribute::new(name, sql_type);
        attr.in_key = true;
        attr
    }

    /// Returns the name of the attribute.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the attribute carries an unresolved SQL expression.
    pub fn is_computed(&self) -> bool {
        self.expression.is_some()
    }
}

/// Ordered attribute catalog of one relation value.
///
/// Key attributes always precede secondary attributes; within each group the
/// declared order is preserved. A heading is immutable once built, operators
/// derive new headings rather than mutating an operand's.
#[derive(PartialEq, Clone, Debug)]
pub struct Heading {
    /// Attributes of the heading, key attributes first.
    attributes: Vec<Attribute>,
    /// Mapping from attribute name to position.
    name_map: HashMap<String, usize>,
}

impl Serialize for Heading {
    /// Custom serialize to avoid serializing name_map.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.attributes.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Heading {
    /// Custom deserialize that routes through the validating constructor.
    fn deserialize<D>(deserializer: D) -> Result<Heading, D::Error>
    where
        D: Deserializer<'de>,
    {
        let attrs = Vec::deserialize(deserializer)?;
        Heading::new(attrs).map_err(D::Error::custom)
    }
}

impl Heading {
    /// Create a new heading, validating its invariants.
    ///
    /// Duplicate names are rejected, key attributes may not be blobs, and a
    /// non-empty heading must have at least one key attribute. Attributes are
    /// reordered key-first, preserving declared order within each group.
    ///
    /// # Arguments
    ///
    /// * `attributes` - Attributes of the heading in declared order.
    pub fn new(attributes: Vec<Attribute>) -> Result<Self, RelSqlError> {
        Self::build(attributes, true)
    }

    /// Shared constructor. Derived headings may be keyless (the result of
    /// aggregating over the universal heading has only computed columns), so
    /// the key requirement is waived for them; declared headings keep it.
    fn build(attributes: Vec<Attribute>, require_key: bool) -> Result<Self, RelSqlError> {
        let mut seen = HashSet::new();
        for attr in &attributes {
            if !seen.insert(attr.name.clone()) {
                return Err(RelSqlError::DuplicateAttributeError(attr.name.clone()));
            }
            if attr.in_key && attr.is_blob {
                return Err(RelSqlError::ValidationError(format!(
                    "key attribute {} may not be a blob",
                    attr.name
                )));
            }
        }
        if require_key && !attributes.is_empty() && !attributes.iter().any(|a| a.in_key) {
            return Err(RelSqlError::ValidationError(String::from(
                "heading has no key attribute",
            )));
        }
        Ok(Self::assemble(attributes))
    }

    /// The degenerate universal heading with zero attributes, used by the
    /// aggregate-all operator.
    pub fn universal() -> Self {
        Self::assemble(Vec::new())
    }

    /// Builds a heading from attributes already known to be valid.
    fn assemble(attributes: Vec<Attribute>) -> Self {
        let mut ordered: Vec<Attribute> = Vec::with_capacity(attributes.len());
        for attr in attributes.iter().filter(|a| a.in_key) {
            ordered.push(attr.clone());
        }
        for attr in attributes.iter().filter(|a| !a.in_key) {
            ordered.push(attr.clone());
        }
        let mut name_map = HashMap::new();
        for (i, attr) in ordered.iter().enumerate() {
            name_map.insert(attr.name.clone(), i);
        }
        Self {
            attributes: ordered,
            name_map,
        }
    }

    /// True for the zero-attribute universal heading.
    pub fn is_universal(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Check if the attribute name is in the heading.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the attribute to look for.
    pub fn contains(&self, name: &str) -> bool {
        self.name_map.contains_key(name)
    }

    /// Get the attribute with the given name.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the attribute to look for.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.name_map.get(name).map(|i| &self.attributes[*i])
    }

    /// Get an iterator of the attributes, key attributes first.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Returns the number of attributes.
    pub fn size(&self) -> usize {
        self.attributes.len()
    }

    /// Names of all attributes, key attributes first.
    pub fn names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    /// Names of the primary-key attributes in declared order.
    pub fn key(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| a.in_key)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Names of the secondary attributes in declared order.
    pub fn secondary(&self) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|a| !a.in_key)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Names present in both headings, in this heading's order.
    ///
    /// # Arguments
    ///
    /// * `other` - Heading to intersect with.
    pub fn common_attrs(&self, other: &Heading) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|a| other.contains(&a.name))
            .map(|a| a.name.clone())
            .collect()
    }

    /// True when any attribute carries an unresolved expression.
    pub fn has_unresolved(&self) -> bool {
        self.attributes.iter().any(|a| a.is_computed())
    }

    /// The functional-dependency rule: this heading determines `other` iff
    /// every key attribute of `other` is present here, as key or secondary.
    /// Reflexive, and may hold in both directions at once.
    ///
    /// # Arguments
    ///
    /// * `other` - Heading whose key is tested.
    pub fn determines(&self, other: &Heading) -> bool {
        other
            .attributes
            .iter()
            .filter(|a| a.in_key)
            .all(|a| self.contains(&a.name))
    }

    /// Derive the heading of a projection.
    ///
    /// Key attributes always propagate unless renamed away; `keep` controls
    /// secondary attributes only. A rename consumes the old name, introduces
    /// the new one with the old key status, and records the old column as the
    /// new attribute's expression. Extended attributes are secondary,
    /// nullable computed columns. `force_key` promotes result attributes into
    /// the key.
    ///
    /// # Arguments
    ///
    /// * `keep` - Secondary attribute names to keep.
    /// * `rename` - Pairs of (new name, old name).
    /// * `extend` - Pairs of (new name, SQL expression).
    /// * `force_key` - Result attribute names to promote into the key.
    pub fn project(
        &self,
        keep: &[&str],
        rename: &[(&str, &str)],
        extend: &[(&str, &str)],
        force_key: &[&str],
    ) -> Result<Heading, RelSqlError> {
        for name in keep {
            if !self.contains(name) {
                return Err(RelSqlError::UnknownAttributeError((*name).to_string()));
            }
        }
        let mut rename_by_old: HashMap<&str, &str> = HashMap::new();
        for (new_name, old_name) in rename {
            if !self.contains(old_name) {
                return Err(RelSqlError::UnknownAttributeError((*old_name).to_string()));
            }
            if rename_by_old.insert(*old_name, *new_name).is_some() {
                return Err(RelSqlError::DuplicateAttributeError(format!(
                    "attribute {} renamed twice",
                    old_name
                )));
            }
        }
        let keep_set: HashSet<&str> = keep.iter().cloned().collect();

        let mut attrs = Vec::new();
        for attr in &self.attributes {
            if let Some(new_name) = rename_by_old.get(attr.name.as_str()) {
                let mut renamed = attr.clone();
                renamed.name = (*new_name).to_string();
                renamed.expression = Some(quote_ident(&attr.name));
                attrs.push(renamed);
            } else if attr.in_key || keep_set.contains(attr.name.as_str()) {
                attrs.push(attr.clone());
            }
        }
        for (name, expr) in extend {
            let mut computed = Attribute::new((*name).to_string(), SqlType::Unknown);
            computed.nullable = true;
            computed.expression = Some((*expr).to_string());
            attrs.push(computed);
        }
        for name in force_key {
            let mut found = false;
            for attr in attrs.iter_mut() {
                if attr.name == *name {
                    attr.in_key = true;
                    found = true;
                }
            }
            if !found {
                return Err(RelSqlError::UnknownAttributeError((*name).to_string()));
            }
        }
        Heading::build(attrs, !self.key().is_empty())
    }

    /// Derive the heading of a natural join.
    ///
    /// The key is chosen by functional dependency, in priority order:
    /// if this heading determines `other` and not conversely, this key wins
    /// and these attributes come first; the mirrored case prefers `other`;
    /// mutual determination falls back to the first rule; otherwise the key
    /// is the union of both keys, with demoted key attributes becoming
    /// secondary. Shared names appear once. With `nullable_from_other`,
    /// attributes taken only from `other` are marked nullable.
    ///
    /// # Arguments
    ///
    /// * `other` - Heading of the other operand.
    /// * `nullable_from_other` - Mark the other operand's attributes nullable.
    pub fn join(&self, other: &Heading, nullable_from_other: bool) -> Result<Heading, RelSqlError> {
        let sd = self.determines(other);
        let od = other.determines(self);
        let other_preferred = od && !sd;
        let (first, second) = if other_preferred {
            (other, self)
        } else {
            (self, other)
        };
        let key_names: HashSet<String> = if sd || od {
            first.key().iter().map(|s| (*s).to_string()).collect()
        } else {
            self.key()
                .iter()
                .chain(other.key().iter())
                .map(|s| (*s).to_string())
                .collect()
        };

        let mut attrs = Vec::new();
        for attr in first.attributes() {
            let shared = second.contains(&attr.name);
            let mut combined = attr.clone();
            combined.expression = None;
            combined.in_key = key_names.contains(&combined.name);
            if nullable_from_other && other_preferred && !shared {
                combined.nullable = true;
            }
            attrs.push(combined);
        }
        for attr in second.attributes() {
            if first.contains(&attr.name) {
                continue;
            }
            let mut combined = attr.clone();
            combined.expression = None;
            combined.in_key = key_names.contains(&combined.name);
            if nullable_from_other && !other_preferred {
                combined.nullable = true;
            }
            attrs.push(combined);
        }
        Heading::build(attrs, false)
    }

    /// A copy of this heading with every expression cleared. Used when a node
    /// is wrapped in a subquery: the inner SELECT has evaluated the
    /// expressions, so the outer layer sees plain columns.
    pub fn resolve_expressions(&self) -> Heading {
        let attrs = self
            .attributes
            .iter()
            .map(|a| {
                let mut resolved = a.clone();
                resolved.expression = None;
                resolved
            })
            .collect();
        Self::assemble(attrs)
    }
}
