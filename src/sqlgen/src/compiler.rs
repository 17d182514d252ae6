use common::condition::Condition;
use common::heading::Heading;
use common::query::{NodeRef, QueryNode};
use common::{quote_ident, CompiledQuery, RelSqlError, SqlLiteral};
use log::{debug, warn};

/// One ordering key for the terminal statement.
#[derive(Debug, Clone)]
pub struct OrderBy {
    /// Attribute to order by, validated against the root heading.
    pub attr: String,
    /// Descending order when set.
    pub descending: bool,
}

impl OrderBy {
    /// Ascending order on the given attribute.
    pub fn asc(attr: &str) -> Self {
        Self {
            attr: attr.to_string(),
            descending: false,
        }
    }

    /// Descending order on the given attribute.
    pub fn desc(attr: &str) -> Self {
        Self {
            attr: attr.to_string(),
            descending: true,
        }
    }
}

/// Options applied to the terminal statement only. ORDER BY, LIMIT and
/// OFFSET are never attached to inner nodes.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Ordering keys.
    pub order_by: Vec<OrderBy>,
    /// Maximum number of rows.
    pub limit: Option<u64>,
    /// Number of rows to skip.
    pub offset: Option<u64>,
}

/// Subquery alias source, scoped to one compilation call so aliases are
/// `s1, s2, ...` with no reuse and no cross-query interference.
struct AliasGen {
    next: u32,
}

impl AliasGen {
    fn new() -> Self {
        Self { next: 0 }
    }

    fn fresh(&mut self) -> String {
        self.next += 1;
        format!("s{}", self.next)
    }
}

/// The clause-by-clause form of one SELECT under assembly.
///
/// `from_params` holds placeholders rendered inside the FROM clause,
/// `filter_params` those of WHERE and HAVING; keeping them apart preserves
/// placeholder order when fragments are combined.
struct SelectBody {
    /// Select list as (output name, rendered expression).
    columns: Vec<(String, String)>,
    /// Rendered FROM clause.
    from: String,
    from_params: Vec<SqlLiteral>,
    where_clauses: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    filter_params: Vec<SqlLiteral>,
    /// The select list is an unmodified passthrough of the FROM columns.
    /// Only such fragments may be inlined into an enclosing join.
    plain: bool,
    /// The body aggregates; restrictions on it become HAVING and enclosing
    /// operators must materialize it first.
    grouped: bool,
}

/// A compiled node: either a composable SELECT or a set operation, which
/// enclosing operators always wrap.
enum Compiled {
    Body(SelectBody),
    SetOp {
        sql: String,
        params: Vec<SqlLiteral>,
    },
}

fn passthrough_columns(heading: &Heading) -> Vec<(String, String)> {
    heading
        .attributes()
        .map(|a| (a.name.clone(), quote_ident(&a.name)))
        .collect()
}

fn heading_columns(heading: &Heading) -> Vec<(String, String)> {
    heading
        .attributes()
        .map(|a| match &a.expression {
            Some(expr) => (
                a.name.clone(),
                format!("{} AS {}", expr, quote_ident(&a.name)),
            ),
            None => (a.name.clone(), quote_ident(&a.name)),
        })
        .collect()
}

fn render(body: &SelectBody) -> Result<(String, Vec<SqlLiteral>), RelSqlError> {
    if body.columns.is_empty() {
        return Err(RelSqlError::ValidationError(String::from(
            "cannot compile a relation with an empty select list",
        )));
    }
    let cols: Vec<&str> = body.columns.iter().map(|(_, c)| c.as_str()).collect();
    let mut sql = format!("SELECT {} FROM {}", cols.join(", "), body.from);
    if !body.where_clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&body.where_clauses.join(" AND "));
    }
    if !body.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&body.group_by.join(", "));
    }
    if !body.having.is_empty() {
        sql.push_str(" HAVING ");
        sql.push_str(&body.having.join(" AND "));
    }
    let mut params = body.from_params.clone();
    params.extend(body.filter_params.iter().cloned());
    Ok((sql, params))
}

/// Materializes a compiled node as a parenthesized, aliased subquery. The
/// wrapper sees the node's output columns as plain names: every computed
/// expression has been evaluated by the inner SELECT.
fn wrap(
    compiled: Compiled,
    heading: &Heading,
    gen: &mut AliasGen,
) -> Result<SelectBody, RelSqlError> {
    let (sql, params) = match compiled {
        Compiled::Body(ref body) => render(body)?,
        Compiled::SetOp {
            ref sql,
            ref params,
        } => (sql.clone(), params.clone()),
    };
    let alias = gen.fresh();
    let resolved = heading.resolve_expressions();
    Ok(SelectBody {
        columns: passthrough_columns(&resolved),
        from: format!("({}) AS {}", sql, alias),
        from_params: params,
        where_clauses: Vec::new(),
        group_by: Vec::new(),
        having: Vec::new(),
        filter_params: Vec::new(),
        plain: true,
        grouped: false,
    })
}

fn compile(node: &QueryNode, gen: &mut AliasGen) -> Result<Compiled, RelSqlError> {
    match node {
        QueryNode::Base { table, heading } => Ok(Compiled::Body(SelectBody {
            columns: passthrough_columns(heading),
            from: table.qualified(),
            from_params: Vec::new(),
            where_clauses: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            filter_params: Vec::new(),
            plain: true,
            grouped: false,
        })),
        QueryNode::Restrict { operand, condition } => compile_restrict(operand, condition, gen),
        QueryNode::Project { operand, heading } => compile_project(operand, heading, gen),
        QueryNode::Join {
            left,
            right,
            heading,
        } => compile_join(left, right, heading, gen),
        QueryNode::Aggregate {
            operand,
            grouping,
            keep_unmatched,
            heading,
            ..
        } => compile_aggregate(operand, grouping, *keep_unmatched, heading, gen),
        QueryNode::Union {
            left,
            right,
            heading,
        } => compile_union(left, right, heading, gen),
    }
}

/// True when the condition must see the operand's computed attributes
/// materialized before it may reference them.
fn needs_resolution(heading: &Heading, condition: &Condition) -> bool {
    if !heading.has_unresolved() {
        return false;
    }
    // A verbatim predicate may reference anything.
    if condition.contains_raw() {
        return true;
    }
    condition
        .referenced_attrs()
        .iter()
        .any(|name| heading.get(name).map(|a| a.is_computed()).unwrap_or(false))
}

fn compile_restrict(
    operand: &NodeRef,
    condition: &Condition,
    gen: &mut AliasGen,
) -> Result<Compiled, RelSqlError> {
    let inner = compile(operand, gen)?;
    let mut body = match inner {
        Compiled::Body(body) => body,
        set_op => wrap(set_op, operand.heading(), gen)?,
    };
    if body.grouped {
        // A direct restriction on an aggregate filters groups in place.
        let (text, params) = render_condition(condition, gen)?;
        body.having.push(format!("({})", text));
        body.filter_params.extend(params);
        return Ok(Compiled::Body(body));
    }
    if needs_resolution(operand.heading(), condition) {
        body = wrap(Compiled::Body(body), operand.heading(), gen)?;
    }
    let (text, params) = render_condition(condition, gen)?;
    body.where_clauses.push(format!("({})", text));
    body.filter_params.extend(params);
    Ok(Compiled::Body(body))
}

fn compile_project(
    operand: &NodeRef,
    heading: &Heading,
    gen: &mut AliasGen,
) -> Result<Compiled, RelSqlError> {
    let inner = compile(operand, gen)?;
    let mut body = match inner {
        Compiled::Body(body) => {
            if body.plain && !body.grouped {
                body
            } else {
                wrap(Compiled::Body(body), operand.heading(), gen)?
            }
        }
        set_op => wrap(set_op, operand.heading(), gen)?,
    };
    body.columns = heading_columns(heading);
    body.plain = false;
    Ok(Compiled::Body(body))
}

/// Compiles a join operand to a fragment usable in a FROM clause. Plain
/// fragments are inlined; anything that altered its select list, grouped, or
/// is a set operation gets materialized so the natural join sees exactly the
/// operand's attributes.
fn join_fragment(node: &NodeRef, gen: &mut AliasGen) -> Result<SelectBody, RelSqlError> {
    let compiled = compile(node, gen)?;
    match compiled {
        Compiled::Body(body) => {
            if body.plain && !body.grouped {
                Ok(body)
            } else {
                wrap(Compiled::Body(body), node.heading(), gen)
            }
        }
        set_op => wrap(set_op, node.heading(), gen),
    }
}

fn compile_join(
    left: &NodeRef,
    right: &NodeRef,
    heading: &Heading,
    gen: &mut AliasGen,
) -> Result<Compiled, RelSqlError> {
    let lf = join_fragment(left, gen)?;
    let rf = join_fragment(right, gen)?;
    let mut from_params = lf.from_params;
    from_params.extend(rf.from_params);
    let mut where_clauses = lf.where_clauses;
    where_clauses.extend(rf.where_clauses);
    let mut filter_params = lf.filter_params;
    filter_params.extend(rf.filter_params);
    Ok(Compiled::Body(SelectBody {
        columns: passthrough_columns(heading),
        from: format!("{} NATURAL JOIN {}", lf.from, rf.from),
        from_params,
        where_clauses,
        group_by: Vec::new(),
        having: Vec::new(),
        filter_params,
        plain: true,
        grouped: false,
    }))
}

fn compile_aggregate(
    operand: &NodeRef,
    grouping: &NodeRef,
    keep_unmatched: bool,
    heading: &Heading,
    gen: &mut AliasGen,
) -> Result<Compiled, RelSqlError> {
    if grouping.heading().is_universal() {
        // Aggregate-all: one group over every operand row, no GROUP BY.
        let body = aggregate_fragment(operand, gen)?;
        return Ok(Compiled::Body(SelectBody {
            columns: heading_columns(heading),
            from: body.from,
            from_params: body.from_params,
            where_clauses: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            filter_params: Vec::new(),
            plain: false,
            grouped: true,
        }));
    }
    let gf = join_fragment(grouping, gen)?;
    let of = aggregate_fragment(operand, gen)?;
    let joiner = if keep_unmatched {
        " NATURAL LEFT JOIN "
    } else {
        " NATURAL JOIN "
    };
    let mut from_params = gf.from_params;
    from_params.extend(of.from_params);
    Ok(Compiled::Body(SelectBody {
        columns: heading_columns(heading),
        from: format!("{}{}{}", gf.from, joiner, of.from),
        from_params,
        where_clauses: gf.where_clauses,
        group_by: heading.key().iter().map(|n| quote_ident(n)).collect(),
        having: Vec::new(),
        filter_params: gf.filter_params,
        plain: false,
        grouped: true,
    }))
}

/// Compiles the aggregated operand. Only an unrestricted passthrough may be
/// inlined: a restricted operand must be materialized so that a left join
/// still produces the unmatched grouping rows.
fn aggregate_fragment(node: &NodeRef, gen: &mut AliasGen) -> Result<SelectBody, RelSqlError> {
    let compiled = compile(node, gen)?;
    match compiled {
        Compiled::Body(body) => {
            if body.plain && !body.grouped && body.where_clauses.is_empty() {
                Ok(body)
            } else {
                wrap(Compiled::Body(body), node.heading(), gen)
            }
        }
        set_op => wrap(set_op, node.heading(), gen),
    }
}

fn compile_union(
    left: &NodeRef,
    right: &NodeRef,
    heading: &Heading,
    gen: &mut AliasGen,
) -> Result<Compiled, RelSqlError> {
    let order: Vec<String> = heading.names().iter().map(|n| (*n).to_string()).collect();
    let (left_sql, left_params) = union_side(left, &order, gen)?;
    let (right_sql, right_params) = union_side(right, &order, gen)?;
    let mut params = left_params;
    params.extend(right_params);
    Ok(Compiled::SetOp {
        sql: format!("{} UNION {}", left_sql, right_sql),
        params,
    })
}

/// Renders one union operand with its select list in the union's attribute
/// order, so positional UNION semantics line up with the heading.
fn union_side(
    node: &NodeRef,
    order: &[String],
    gen: &mut AliasGen,
) -> Result<(String, Vec<SqlLiteral>), RelSqlError> {
    let compiled = compile(node, gen)?;
    match compiled {
        Compiled::Body(mut body) => {
            body.columns = reorder_columns(&body.columns, order)?;
            render(&body)
        }
        Compiled::SetOp { sql, params } => {
            let names = node.heading().names();
            if names.len() == order.len()
                && names.iter().zip(order.iter()).all(|(a, b)| *a == b.as_str())
            {
                return Ok((sql, params));
            }
            let mut body = wrap(Compiled::SetOp { sql, params }, node.heading(), gen)?;
            body.columns = reorder_columns(&body.columns, order)?;
            render(&body)
        }
    }
}

fn reorder_columns(
    columns: &[(String, String)],
    order: &[String],
) -> Result<Vec<(String, String)>, RelSqlError> {
    let mut reordered = Vec::with_capacity(order.len());
    for name in order {
        let found = columns
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| RelSqlError::UnknownAttributeError(name.clone()))?;
        reordered.push(found.clone());
    }
    Ok(reordered)
}

fn render_condition(
    condition: &Condition,
    gen: &mut AliasGen,
) -> Result<(String, Vec<SqlLiteral>), RelSqlError> {
    match condition {
        Condition::True => Ok((String::from("TRUE"), Vec::new())),
        Condition::False => Ok((String::from("FALSE"), Vec::new())),
        Condition::Equals(pairs) => {
            let mut parts = Vec::new();
            let mut params = Vec::new();
            for (name, value) in pairs {
                match value {
                    SqlLiteral::Null => parts.push(format!("{} IS NULL", quote_ident(name))),
                    _ => {
                        parts.push(format!("{} = ?", quote_ident(name)));
                        params.push(value.clone());
                    }
                }
            }
            Ok((parts.join(" AND "), params))
        }
        Condition::AndList(conds) => combine_conditions(conds, " AND ", "TRUE", gen),
        Condition::OrList(conds) => combine_conditions(conds, " OR ", "FALSE", gen),
        Condition::Membership { node, attrs } => {
            let compiled = compile(node, gen)?;
            let (inner_sql, inner_params) = match compiled {
                Compiled::Body(ref body) => render(body)?,
                Compiled::SetOp { sql, params } => (sql, params),
            };
            let alias = gen.fresh();
            let cols: Vec<String> = attrs.iter().map(|a| quote_ident(a)).collect();
            let lhs = if cols.len() == 1 {
                cols[0].clone()
            } else {
                format!("({})", cols.join(", "))
            };
            Ok((
                format!(
                    "{} IN (SELECT {} FROM ({}) AS {})",
                    lhs,
                    cols.join(", "),
                    inner_sql,
                    alias
                ),
                inner_params,
            ))
        }
        Condition::Not(inner) => {
            let (text, params) = render_condition(inner, gen)?;
            Ok((format!("NOT ({})", text), params))
        }
        Condition::Raw(sql) => Ok((sql.clone(), Vec::new())),
    }
}

fn combine_conditions(
    conds: &[Condition],
    separator: &str,
    empty: &str,
    gen: &mut AliasGen,
) -> Result<(String, Vec<SqlLiteral>), RelSqlError> {
    if conds.is_empty() {
        return Ok((empty.to_string(), Vec::new()));
    }
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for cond in conds {
        let (text, cond_params) = render_condition(cond, gen)?;
        parts.push(format!("({})", text));
        params.extend(cond_params);
    }
    Ok((parts.join(separator), params))
}

/// Compiles the tree into one executable SELECT statement.
///
/// Ordering attributes are validated against the root heading. An offset
/// without a limit is legal but logged, since it is frequently a caller
/// mistake.
///
/// # Arguments
///
/// * `node` - Root of the query tree.
/// * `options` - Terminal ORDER BY / LIMIT / OFFSET.
pub fn build(node: &NodeRef, options: &BuildOptions) -> Result<CompiledQuery, RelSqlError> {
    for key in &options.order_by {
        if !node.heading().contains(&key.attr) {
            return Err(RelSqlError::UnknownAttributeError(key.attr.clone()));
        }
    }
    if options.offset.is_some() && options.limit.is_none() {
        warn!("offset without limit on the terminal statement");
    }
    if options.limit == Some(0) {
        debug!("limit 0 compiles to a statement that returns no rows");
    }
    let mut gen = AliasGen::new();
    let compiled = compile(node, &mut gen)?;
    let (mut sql, params) = match compiled {
        Compiled::Body(ref body) => render(body)?,
        Compiled::SetOp { sql, params } => (sql, params),
    };
    if !options.order_by.is_empty() {
        let keys: Vec<String> = options
            .order_by
            .iter()
            .map(|key| {
                if key.descending {
                    format!("{} DESC", quote_ident(&key.attr))
                } else {
                    quote_ident(&key.attr)
                }
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }
    if let Some(limit) = options.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = options.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }
    Ok(CompiledQuery::new(sql, params))
}

/// Compiles a DELETE for a base relation or a restriction chain over one,
/// the node shapes cascade planning produces.
///
/// # Arguments
///
/// * `node` - Base node or restriction chain over a base node.
pub fn build_delete(node: &NodeRef) -> Result<CompiledQuery, RelSqlError> {
    match &**node {
        QueryNode::Base { table, .. } => Ok(CompiledQuery::new(
            format!("DELETE FROM {}", table.qualified()),
            Vec::new(),
        )),
        QueryNode::Restrict { operand, condition } => match &**operand {
            QueryNode::Base { table, .. } => {
                let mut gen = AliasGen::new();
                let (text, params) = render_condition(condition, &mut gen)?;
                Ok(CompiledQuery::new(
                    format!("DELETE FROM {} WHERE ({})", table.qualified(), text),
                    params,
                ))
            }
            _ => Err(RelSqlError::ValidationError(String::from(
                "delete requires a base relation or a restriction over one",
            ))),
        },
        _ => Err(RelSqlError::ValidationError(String::from(
            "delete requires a base relation or a restriction over one",
        ))),
    }
}

/// Compiles a COUNT(*) over the tree's result.
///
/// # Arguments
///
/// * `node` - Root of the query tree.
pub fn build_count(node: &NodeRef) -> Result<CompiledQuery, RelSqlError> {
    let mut gen = AliasGen::new();
    let compiled = compile(node, &mut gen)?;
    let (sql, params) = match compiled {
        Compiled::Body(ref body) => render(body)?,
        Compiled::SetOp { sql, params } => (sql, params),
    };
    let alias = gen.fresh();
    Ok(CompiledQuery::new(
        format!("SELECT COUNT(*) FROM ({}) AS {}", sql, alias),
        params,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::condition::Restriction;
    use common::testutil::{init, int_base};
    use common::SqlLiteral;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn assert_parses(sql: &str) {
        let result = Parser::parse_sql(&GenericDialect {}, sql);
        assert!(result.is_ok(), "did not parse: {}\n{:?}", sql, result);
    }

    fn build_sql(node: &NodeRef) -> CompiledQuery {
        let q = build(node, &BuildOptions::default()).unwrap();
        assert_parses(&q.sql);
        q
    }

    #[test]
    fn test_base_select() {
        init();
        let t = int_base("t", &["x"], &["z"]);
        let q = build_sql(&t);
        assert_eq!(q.sql, "SELECT \"x\", \"z\" FROM \"t\"");
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_restrict_equality() {
        let t = int_base("t", &["x"], &["z"]);
        let r = QueryNode::restrict(&t, Restriction::eq("x", SqlLiteral::Int(1))).unwrap();
        let q = build_sql(&r);
        assert_eq!(q.sql, "SELECT \"x\", \"z\" FROM \"t\" WHERE (\"x\" = ?)");
        assert_eq!(q.params, vec![SqlLiteral::Int(1)]);
    }

    #[test]
    fn test_restrict_null_literal() {
        let t = int_base("t", &["x"], &["z"]);
        let r = QueryNode::restrict(&t, Restriction::eq("z", SqlLiteral::Null)).unwrap();
        let q = build_sql(&r);
        assert_eq!(q.sql, "SELECT \"x\", \"z\" FROM \"t\" WHERE (\"z\" IS NULL)");
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_chained_restrictions_compile_as_one_conjunction() {
        let t = int_base("t", &["x"], &["z"]);
        let r1 = QueryNode::restrict(&t, Restriction::eq("x", SqlLiteral::Int(1))).unwrap();
        let r2 = QueryNode::restrict(&r1, Restriction::eq("z", SqlLiteral::Int(2))).unwrap();
        let q = build_sql(&r2);
        assert_eq!(
            q.sql,
            "SELECT \"x\", \"z\" FROM \"t\" WHERE ((\"x\" = ?) AND (\"z\" = ?))"
        );
        assert_eq!(q.params, vec![SqlLiteral::Int(1), SqlLiteral::Int(2)]);
    }

    #[test]
    fn test_empty_or_list_matches_nothing() {
        let t = int_base("t", &["x"], &[]);
        let r = QueryNode::restrict(&t, Restriction::AnyOf(vec![])).unwrap();
        let q = build_sql(&r);
        assert_eq!(q.sql, "SELECT \"x\" FROM \"t\" WHERE (FALSE)");
    }

    #[test]
    fn test_or_list() {
        let t = int_base("t", &["x"], &[]);
        let r = QueryNode::restrict(
            &t,
            Restriction::AnyOf(vec![
                vec![(String::from("x"), SqlLiteral::Int(1))],
                vec![(String::from("x"), SqlLiteral::Int(2))],
            ]),
        )
        .unwrap();
        let q = build_sql(&r);
        assert_eq!(
            q.sql,
            "SELECT \"x\" FROM \"t\" WHERE ((\"x\" = ?) OR (\"x\" = ?))"
        );
        assert_eq!(q.params, vec![SqlLiteral::Int(1), SqlLiteral::Int(2)]);
    }

    #[test]
    fn test_project_rename_and_keep() {
        let t = int_base("t", &["x"], &["z", "w"]);
        let p = QueryNode::project(&t, &["z"], &[("id", "x")], &[], &[]).unwrap();
        let q = build_sql(&p);
        assert_eq!(q.sql, "SELECT \"x\" AS \"id\", \"z\" FROM \"t\"");
    }

    #[test]
    fn test_project_extension() {
        let t = int_base("t", &["x"], &[]);
        let p = QueryNode::project(&t, &[], &[], &[("total", "\"x\" + 1")], &[]).unwrap();
        let q = build_sql(&p);
        assert_eq!(q.sql, "SELECT \"x\", \"x\" + 1 AS \"total\" FROM \"t\"");
    }

    #[test]
    fn test_restrict_on_renamed_attribute_wraps() {
        let t = int_base("t", &["x"], &["z"]);
        let p = QueryNode::project(&t, &["z"], &[("id", "x")], &[], &[]).unwrap();
        let r = QueryNode::restrict(&p, Restriction::eq("id", SqlLiteral::Int(5))).unwrap();
        let q = build_sql(&r);
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"z\" FROM (SELECT \"x\" AS \"id\", \"z\" FROM \"t\") AS s1 \
             WHERE (\"id\" = ?)"
        );
        assert_eq!(q.params, vec![SqlLiteral::Int(5)]);
    }

    #[test]
    fn test_restrict_on_plain_attribute_of_projection_stays_inline() {
        let t = int_base("t", &["x"], &["z"]);
        let p = QueryNode::project(&t, &["z"], &[("id", "x")], &[], &[]).unwrap();
        let r = QueryNode::restrict(&p, Restriction::eq("z", SqlLiteral::Int(5))).unwrap();
        let q = build_sql(&r);
        assert_eq!(
            q.sql,
            "SELECT \"x\" AS \"id\", \"z\" FROM \"t\" WHERE (\"z\" = ?)"
        );
    }

    #[test]
    fn test_natural_join() {
        let a = int_base("a", &["x", "y"], &["z"]);
        let b = int_base("b", &["x"], &["w"]);
        let j = QueryNode::join(&a, &b).unwrap();
        let q = build_sql(&j);
        assert_eq!(
            q.sql,
            "SELECT \"x\", \"y\", \"z\", \"w\" FROM \"a\" NATURAL JOIN \"b\""
        );
    }

    #[test]
    fn test_join_inlines_restrictions() {
        let a = int_base("a", &["x"], &["z"]);
        let b = int_base("b", &["x"], &["w"]);
        let ra = QueryNode::restrict(&a, Restriction::eq("z", SqlLiteral::Int(1))).unwrap();
        let rb = QueryNode::restrict(&b, Restriction::eq("w", SqlLiteral::Int(2))).unwrap();
        let j = QueryNode::join(&ra, &rb).unwrap();
        let q = build_sql(&j);
        assert_eq!(
            q.sql,
            "SELECT \"x\", \"z\", \"w\" FROM \"a\" NATURAL JOIN \"b\" \
             WHERE (\"z\" = ?) AND (\"w\" = ?)"
        );
        assert_eq!(q.params, vec![SqlLiteral::Int(1), SqlLiteral::Int(2)]);
    }

    #[test]
    fn test_join_wraps_projected_side() {
        let a = int_base("a", &["x"], &[]);
        let b = int_base("b", &["x"], &["z", "drop_me"]);
        let p = QueryNode::project(&b, &["z"], &[], &[], &[]).unwrap();
        let j = QueryNode::join(&a, &p).unwrap();
        let q = build_sql(&j);
        assert_eq!(
            q.sql,
            "SELECT \"x\", \"z\" FROM \"a\" NATURAL JOIN \
             (SELECT \"x\", \"z\" FROM \"b\") AS s1"
        );
    }

    #[test]
    fn test_semijoin_membership() {
        let a = int_base("a", &["x"], &["z"]);
        let b = int_base("b", &["x"], &["w"]);
        let r = QueryNode::restrict(&a, Restriction::ByNode(b)).unwrap();
        let q = build_sql(&r);
        assert_eq!(
            q.sql,
            "SELECT \"x\", \"z\" FROM \"a\" WHERE (\"x\" IN \
             (SELECT \"x\" FROM (SELECT \"x\", \"w\" FROM \"b\") AS s1))"
        );
    }

    #[test]
    fn test_antijoin_membership() {
        let a = int_base("a", &["x"], &[]);
        let b = int_base("b", &["x"], &[]);
        let r = QueryNode::restrict(&a, Restriction::not_in(b)).unwrap();
        let q = build_sql(&r);
        assert_eq!(
            q.sql,
            "SELECT \"x\" FROM \"a\" WHERE (NOT (\"x\" IN \
             (SELECT \"x\" FROM (SELECT \"x\" FROM \"b\") AS s1)))"
        );
    }

    #[test]
    fn test_multi_attribute_membership() {
        let a = int_base("a", &["x", "y"], &[]);
        let b = int_base("b", &["x", "y"], &["w"]);
        let r = QueryNode::restrict(&a, Restriction::ByNode(b)).unwrap();
        let q = build(&r, &BuildOptions::default()).unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"x\", \"y\" FROM \"a\" WHERE ((\"x\", \"y\") IN \
             (SELECT \"x\", \"y\" FROM (SELECT \"x\", \"y\", \"w\" FROM \"b\") AS s1))"
        );
    }

    #[test]
    fn test_aggregate_with_left_join() {
        let sales = int_base("sales", &["id"], &["customer", "amount"]);
        let customers = int_base("customers", &["customer"], &["name"]);
        let agg = QueryNode::aggregate(
            &sales,
            &customers,
            &[("total", "SUM(\"amount\")")],
            true,
        )
        .unwrap();
        let q = build_sql(&agg);
        assert_eq!(
            q.sql,
            "SELECT \"customer\", \"name\", SUM(\"amount\") AS \"total\" \
             FROM \"customers\" NATURAL LEFT JOIN \"sales\" GROUP BY \"customer\""
        );
    }

    #[test]
    fn test_aggregate_wraps_restricted_operand() {
        let sales = int_base("sales", &["id"], &["customer", "amount"]);
        let customers = int_base("customers", &["customer"], &[]);
        let recent = QueryNode::restrict(&sales, Restriction::eq("amount", SqlLiteral::Int(10)))
            .unwrap();
        let agg =
            QueryNode::aggregate(&recent, &customers, &[("n", "COUNT(*)")], true).unwrap();
        let q = build_sql(&agg);
        assert_eq!(
            q.sql,
            "SELECT \"customer\", COUNT(*) AS \"n\" FROM \"customers\" NATURAL LEFT JOIN \
             (SELECT \"id\", \"customer\", \"amount\" FROM \"sales\" \
             WHERE (\"amount\" = ?)) AS s1 GROUP BY \"customer\""
        );
        assert_eq!(q.params, vec![SqlLiteral::Int(10)]);
    }

    #[test]
    fn test_restrict_aggregate_renders_having() {
        let sales = int_base("sales", &["id"], &["customer", "amount"]);
        let customers = int_base("customers", &["customer"], &[]);
        let agg = QueryNode::aggregate(
            &sales,
            &customers,
            &[("total", "SUM(\"amount\")")],
            false,
        )
        .unwrap();
        let r = QueryNode::restrict(&agg, Restriction::Raw(String::from("\"total\" > 100")))
            .unwrap();
        let q = build_sql(&r);
        assert_eq!(
            q.sql,
            "SELECT \"customer\", SUM(\"amount\") AS \"total\" \
             FROM \"customers\" NATURAL JOIN \"sales\" GROUP BY \"customer\" \
             HAVING (\"total\" > 100)"
        );
    }

    #[test]
    fn test_aggregate_all_has_no_group_by() {
        let sales = int_base("sales", &["id"], &["amount"]);
        let agg = QueryNode::aggregate(
            &sales,
            &QueryNode::universal(),
            &[("n", "COUNT(*)")],
            false,
        )
        .unwrap();
        let q = build_sql(&agg);
        assert_eq!(q.sql, "SELECT COUNT(*) AS \"n\" FROM \"sales\"");
    }

    #[test]
    fn test_join_wraps_aggregate() {
        let sales = int_base("sales", &["id"], &["customer", "amount"]);
        let customers = int_base("customers", &["customer"], &[]);
        let agg =
            QueryNode::aggregate(&sales, &customers, &[("n", "COUNT(*)")], false).unwrap();
        let regions = int_base("regions", &["customer"], &["region"]);
        let j = QueryNode::join(&agg, &regions).unwrap();
        let q = build_sql(&j);
        assert_eq!(
            q.sql,
            "SELECT \"customer\", \"n\", \"region\" FROM \
             (SELECT \"customer\", COUNT(*) AS \"n\" FROM \"customers\" NATURAL JOIN \"sales\" \
             GROUP BY \"customer\") AS s1 NATURAL JOIN \"regions\""
        );
    }

    #[test]
    fn test_union() {
        let a = int_base("a", &["x"], &["z"]);
        let b = int_base("b", &["x"], &["z"]);
        let u = QueryNode::union(&a, &b).unwrap();
        let q = build_sql(&u);
        assert_eq!(
            q.sql,
            "SELECT \"x\", \"z\" FROM \"a\" UNION SELECT \"x\", \"z\" FROM \"b\""
        );
    }

    #[test]
    fn test_union_reorders_right_operand() {
        let a = int_base("a", &["x"], &["z"]);
        // Same attribute names, different key split, so the declared order
        // differs and the right select list is permuted to match.
        let b = int_base("b", &["z"], &["x"]);
        let u = QueryNode::union(&a, &b).unwrap();
        let q = build_sql(&u);
        assert_eq!(
            q.sql,
            "SELECT \"x\", \"z\" FROM \"a\" UNION SELECT \"x\", \"z\" FROM \"b\""
        );
    }

    #[test]
    fn test_restricted_union_wraps() {
        let a = int_base("a", &["x"], &[]);
        let b = int_base("b", &["x"], &[]);
        let u = QueryNode::union(&a, &b).unwrap();
        let r = QueryNode::restrict(&u, Restriction::eq("x", SqlLiteral::Int(3))).unwrap();
        let q = build_sql(&r);
        assert_eq!(
            q.sql,
            "SELECT \"x\" FROM (SELECT \"x\" FROM \"a\" UNION SELECT \"x\" FROM \"b\") AS s1 \
             WHERE (\"x\" = ?)"
        );
    }

    #[test]
    fn test_terminal_order_limit_offset() {
        let t = int_base("t", &["x"], &["z"]);
        let options = BuildOptions {
            order_by: vec![OrderBy::asc("x"), OrderBy::desc("z")],
            limit: Some(10),
            offset: Some(20),
        };
        let q = build(&t, &options).unwrap();
        assert_eq!(
            q.sql,
            "SELECT \"x\", \"z\" FROM \"t\" ORDER BY \"x\", \"z\" DESC LIMIT 10 OFFSET 20"
        );
        assert_parses(&q.sql);
    }

    #[test]
    fn test_order_by_unknown_attribute() {
        let t = int_base("t", &["x"], &[]);
        let options = BuildOptions {
            order_by: vec![OrderBy::asc("missing")],
            limit: None,
            offset: None,
        };
        match build(&t, &options) {
            Err(RelSqlError::UnknownAttributeError(_)) => (),
            other => panic!("expected unknown attribute, got {:?}", other),
        }
    }

    #[test]
    fn test_offset_without_limit_is_allowed() {
        init();
        let t = int_base("t", &["x"], &[]);
        let options = BuildOptions {
            order_by: vec![],
            limit: None,
            offset: Some(5),
        };
        let q = build(&t, &options).unwrap();
        assert_eq!(q.sql, "SELECT \"x\" FROM \"t\" OFFSET 5");
    }

    #[test]
    fn test_limit_zero_compiles() {
        let t = int_base("t", &["x"], &[]);
        let options = BuildOptions {
            order_by: vec![],
            limit: Some(0),
            offset: None,
        };
        let q = build(&t, &options).unwrap();
        assert_eq!(q.sql, "SELECT \"x\" FROM \"t\" LIMIT 0");
    }

    #[test]
    fn test_aliases_are_monotonic() {
        let a = int_base("a", &["x"], &["keep1", "drop1"]);
        let b = int_base("b", &["x"], &["keep2", "drop2"]);
        let pa = QueryNode::project(&a, &["keep1"], &[], &[], &[]).unwrap();
        let pb = QueryNode::project(&b, &["keep2"], &[], &[], &[]).unwrap();
        let j = QueryNode::join(&pa, &pb).unwrap();
        let q = build_sql(&j);
        assert!(q.sql.contains("AS s1"));
        assert!(q.sql.contains("AS s2"));
        assert!(!q.sql.contains("AS s3"));
    }

    #[test]
    fn test_build_delete_full_table() {
        let t = int_base("t", &["x"], &[]);
        let q = build_delete(&t).unwrap();
        assert_eq!(q.sql, "DELETE FROM \"t\"");
    }

    #[test]
    fn test_build_delete_restricted() {
        let t = int_base("t", &["x"], &[]);
        let r = QueryNode::restrict(&t, Restriction::eq("x", SqlLiteral::Int(4))).unwrap();
        let q = build_delete(&r).unwrap();
        assert_eq!(q.sql, "DELETE FROM \"t\" WHERE (\"x\" = ?)");
        assert_eq!(q.params, vec![SqlLiteral::Int(4)]);
        assert_parses(&q.sql);
    }

    #[test]
    fn test_build_delete_with_membership() {
        let parent = int_base("parent", &["x"], &[]);
        let child = int_base("child", &["x", "y"], &[]);
        let restricted_parent =
            QueryNode::restrict(&parent, Restriction::eq("x", SqlLiteral::Int(1))).unwrap();
        let r = QueryNode::restrict(&child, Restriction::ByNode(restricted_parent)).unwrap();
        let q = build_delete(&r).unwrap();
        assert_eq!(
            q.sql,
            "DELETE FROM \"child\" WHERE (\"x\" IN (SELECT \"x\" FROM \
             (SELECT \"x\" FROM \"parent\" WHERE (\"x\" = ?)) AS s1))"
        );
        assert_eq!(q.params, vec![SqlLiteral::Int(1)]);
        assert_parses(&q.sql);
    }

    #[test]
    fn test_build_delete_rejects_derived_nodes() {
        let a = int_base("a", &["x"], &[]);
        let b = int_base("b", &["x"], &[]);
        let j = QueryNode::join(&a, &b).unwrap();
        assert!(build_delete(&j).is_err());
    }

    #[test]
    fn test_build_count() {
        let t = int_base("t", &["x"], &[]);
        let r = QueryNode::restrict(&t, Restriction::eq("x", SqlLiteral::Int(9))).unwrap();
        let q = build_count(&r).unwrap();
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM (SELECT \"x\" FROM \"t\" WHERE (\"x\" = ?)) AS s1"
        );
        assert_eq!(q.params, vec![SqlLiteral::Int(9)]);
        assert_parses(&q.sql);
    }

    #[test]
    fn test_param_order_follows_text_order() {
        let a = int_base("a", &["x"], &["z"]);
        let b = int_base("b", &["x"], &["w", "drop_me"]);
        let pb = QueryNode::project(&b, &["w"], &[], &[], &[]).unwrap();
        let rb = QueryNode::restrict(&pb, Restriction::eq("w", SqlLiteral::Int(2))).unwrap();
        let j = QueryNode::join(&a, &rb).unwrap();
        let outer = QueryNode::restrict(&j, Restriction::eq("z", SqlLiteral::Int(3))).unwrap();
        let q = build_sql(&outer);
        // The projected side is materialized in the FROM clause, so its
        // parameter precedes the outer restriction's.
        let in_from = q.sql.find("\"w\" = ?").unwrap();
        let in_where = q.sql.find("\"z\" = ?").unwrap();
        assert!(in_from < in_where);
        assert_eq!(q.params, vec![SqlLiteral::Int(2), SqlLiteral::Int(3)]);
    }
}
