//! Builds parameterized SELECT statements. Identifiers come from the catalogs
//! only; every caller-supplied value is a parameter.

use crate::sql::params::BindValue;
use serde::{Deserialize, Serialize};

/// Quote identifier for PostgreSQL (safe: only from catalogs).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `"alias"."column"`
pub fn column_ref(alias: &str, column: &str) -> String {
    format!("{}.{}", quoted(alias), quoted(column))
}

/// Rendered statement with `$n` placeholders, ready for the executor.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

/// A piece of SQL using `?` as the parameter marker, together with its
/// parameters in textual order. Fragments nest freely; numbering happens once
/// when the outermost statement is built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fragment {
    sql: String,
    params: Vec<BindValue>,
}

impl Fragment {
    pub fn raw(sql: impl Into<String>) -> Self {
        Fragment {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bound(sql: impl Into<String>, params: Vec<BindValue>) -> Self {
        Fragment {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[BindValue] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn push_sql(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    /// Append a `?` marker and its value.
    pub fn push_param(&mut self, v: BindValue) {
        self.sql.push('?');
        self.params.push(v);
    }

    pub fn append(&mut self, other: Fragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }

    pub fn wrap(self, prefix: &str, suffix: &str) -> Fragment {
        Fragment {
            sql: format!("{}{}{}", prefix, self.sql, suffix),
            params: self.params,
        }
    }

    pub fn join(parts: Vec<Fragment>, sep: &str) -> Fragment {
        let mut out = Fragment::default();
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                out.sql.push_str(sep);
            }
            out.append(part);
        }
        out
    }

    /// `a AND b AND ...`, each part parenthesized.
    pub fn and(parts: Vec<Fragment>) -> Fragment {
        Fragment::join(parts.into_iter().map(|p| p.wrap("(", ")")).collect(), " AND ")
    }

    pub fn into_query(self) -> QueryBuf {
        QueryBuf {
            sql: number_placeholders(&self.sql),
            params: self.params,
        }
    }
}

/// Replace `?` markers outside quoted identifiers and literals with `$1..$n`.
fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut n = 0u32;
    let mut in_single = false;
    let mut in_double = false;
    for c in sql.chars() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                out.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(c);
            }
            '?' if !in_single && !in_double => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(c),
        }
    }
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub alias: String,
    source: Fragment,
    on: Fragment,
}

/// One SELECT statement. Sources are addressed by alias; joins are kept in
/// insertion order so rendering is deterministic.
#[derive(Clone, Debug)]
pub struct SelectQuery {
    distinct: bool,
    columns: Vec<Fragment>,
    from: Fragment,
    from_alias: String,
    joins: Vec<JoinClause>,
    filters: Vec<Fragment>,
    group_by: Vec<String>,
    order_by: Vec<Fragment>,
    limit: Option<u64>,
    offset: Option<u64>,
}

fn table_source(table: &str, alias: &str) -> Fragment {
    if table == alias {
        Fragment::raw(quoted(table))
    } else {
        Fragment::raw(format!("{} AS {}", quoted(table), quoted(alias)))
    }
}

impl SelectQuery {
    fn with_source(from: Fragment, alias: &str) -> Self {
        SelectQuery {
            distinct: false,
            columns: Vec::new(),
            from,
            from_alias: alias.to_string(),
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn from_table(table: &str) -> Self {
        Self::with_source(table_source(table, table), table)
    }

    pub fn from_table_as(table: &str, alias: &str) -> Self {
        Self::with_source(table_source(table, alias), alias)
    }

    pub fn from_subquery(sub: &SelectQuery, alias: &str) -> Self {
        let source = sub.to_fragment().wrap("(", &format!(") AS {}", quoted(alias)));
        Self::with_source(source, alias)
    }

    pub fn from_alias(&self) -> &str {
        &self.from_alias
    }

    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    pub fn select(&mut self, expr: Fragment, alias: &str) {
        self.columns.push(Fragment::join(vec![expr, Fragment::raw(format!("AS {}", quoted(alias)))], " "));
    }

    pub fn clear_columns(&mut self) {
        self.columns.clear();
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// True when `alias` is the FROM source or one of the joins.
    pub fn has_source(&self, alias: &str) -> bool {
        self.from_alias == alias || self.joins.iter().any(|j| j.alias == alias)
    }

    pub fn join_aliases(&self) -> Vec<&str> {
        self.joins.iter().map(|j| j.alias.as_str()).collect()
    }

    pub fn join_kind(&self, alias: &str) -> Option<JoinKind> {
        self.joins.iter().find(|j| j.alias == alias).map(|j| j.kind)
    }

    pub fn join_table(&mut self, kind: JoinKind, table: &str, alias: &str, on: Fragment) {
        self.joins.push(JoinClause {
            kind,
            alias: alias.to_string(),
            source: table_source(table, alias),
            on,
        });
    }

    pub fn join_subquery(&mut self, kind: JoinKind, sub: &SelectQuery, alias: &str, on: Fragment) {
        self.joins.push(JoinClause {
            kind,
            alias: alias.to_string(),
            source: sub.to_fragment().wrap("(", &format!(") AS {}", quoted(alias))),
            on,
        });
    }

    pub fn filter(&mut self, condition: Fragment) {
        self.filters.push(condition);
    }

    pub fn group_by(&mut self, expr: &str) {
        if !self.group_by.iter().any(|g| g == expr) {
            self.group_by.push(expr.to_string());
        }
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    pub fn order_by(&mut self, expr: Fragment) {
        self.order_by.push(expr);
    }

    pub fn has_order(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn set_limit(&mut self, n: Option<u64>) {
        self.limit = n;
    }

    pub fn set_offset(&mut self, n: Option<u64>) {
        self.offset = n;
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn to_fragment(&self) -> Fragment {
        let mut q = Fragment::raw("SELECT ");
        if self.distinct {
            q.push_sql("DISTINCT ");
        }
        if self.columns.is_empty() {
            q.push_sql("*");
        } else {
            q.append(Fragment::join(self.columns.clone(), ", "));
        }
        q.push_sql(" FROM ");
        q.append(self.from.clone());
        for j in &self.joins {
            q.push_sql(" ");
            q.push_sql(j.kind.keyword());
            q.push_sql(" ");
            q.append(j.source.clone());
            q.push_sql(" ON ");
            q.append(j.on.clone());
        }
        if !self.filters.is_empty() {
            q.push_sql(" WHERE ");
            q.append(Fragment::and(self.filters.clone()));
        }
        if !self.group_by.is_empty() {
            q.push_sql(" GROUP BY ");
            q.push_sql(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            q.push_sql(" ORDER BY ");
            q.append(Fragment::join(self.order_by.clone(), ", "));
        }
        if let Some(n) = self.limit {
            q.push_sql(&format!(" LIMIT {}", n));
        }
        if let Some(n) = self.offset {
            q.push_sql(&format!(" OFFSET {}", n));
        }
        q
    }

    pub fn build(&self) -> QueryBuf {
        self.to_fragment().into_query()
    }
}

/// `a UNION b UNION ...` over complete statements.
pub fn union(queries: &[SelectQuery]) -> QueryBuf {
    Fragment::join(queries.iter().map(|q| q.to_fragment()).collect(), " UNION ").into_query()
}
