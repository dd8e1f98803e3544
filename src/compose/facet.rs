//! Facet subqueries: the distinct-key constraint for filtering and the value counts.

use crate::catalog::FieldDescriptor;
use crate::compose::QueryComposer;
use crate::error::CompositionError;
use crate::sql::{BindValue, Fragment, SelectQuery};

/// A numeric facet value such as `[10, 20)`, `(0.5, 1]` or `[100, )`.
#[derive(Clone, Debug, PartialEq)]
pub struct NumericRange {
    pub lower: Option<f64>,
    pub lower_inclusive: bool,
    pub upper: Option<f64>,
    pub upper_inclusive: bool,
}

impl NumericRange {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let lower_inclusive = match s.chars().next()? {
            '[' => true,
            '(' => false,
            _ => return None,
        };
        let upper_inclusive = match s.chars().last()? {
            ']' => true,
            ')' => false,
            _ => return None,
        };
        let inner = s.get(1..s.len() - 1)?;
        let (lo, hi) = inner.split_once(',')?;
        let bound = |b: &str| -> Result<Option<f64>, ()> {
            let b = b.trim();
            if b.is_empty() || b == "*" {
                Ok(None)
            } else {
                b.parse::<f64>().map(Some).map_err(|_| ())
            }
        };
        let lower = bound(lo).ok()?;
        let upper = bound(hi).ok()?;
        if lower.is_none() && upper.is_none() {
            return None;
        }
        Some(NumericRange {
            lower,
            lower_inclusive,
            upper,
            upper_inclusive,
        })
    }

    pub fn predicate(&self, expr: &str) -> Fragment {
        let mut parts = Vec::new();
        if let Some(lo) = self.lower {
            let op = if self.lower_inclusive { ">=" } else { ">" };
            parts.push(Fragment::bound(format!("{} {} ?", expr, op), vec![BindValue::F64(lo)]));
        }
        if let Some(hi) = self.upper {
            let op = if self.upper_inclusive { "<=" } else { "<" };
            parts.push(Fragment::bound(format!("{} {} ?", expr, op), vec![BindValue::F64(hi)]));
        }
        Fragment::join(parts, " AND ")
    }

    pub fn contains(&self, v: f64) -> bool {
        let above = match self.lower {
            Some(lo) if self.lower_inclusive => v >= lo,
            Some(lo) => v > lo,
            None => true,
        };
        let below = match self.upper {
            Some(hi) if self.upper_inclusive => v <= hi,
            Some(hi) => v < hi,
            None => true,
        };
        above && below
    }
}

/// `expr` matches any allowed value: ranges for numeric facets, text equality otherwise.
fn value_predicate(field: &FieldDescriptor, expr: &str) -> Fragment {
    let mut texts = Vec::new();
    let mut parts = Vec::new();
    for v in &field.allowed_values {
        match NumericRange::parse(v).filter(|_| field.is_numeric()) {
            Some(range) => parts.push(range.predicate(expr)),
            None => texts.push(v.clone()),
        }
    }
    if !texts.is_empty() {
        parts.insert(
            0,
            Fragment::bound(format!("CAST({} AS text) = ANY(?)", expr), vec![BindValue::TextArray(texts)]),
        );
    }
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Fragment::join(parts.into_iter().map(|p| p.wrap("(", ")")).collect(), " OR ")
    }
}

/// Root query joined as far as `field` needs, with no projection, and the expression reading it.
pub(crate) fn single_field(composer: &QueryComposer<'_>, field: &FieldDescriptor) -> Result<(SelectQuery, String), CompositionError> {
    let mut plain = field.clone();
    plain.aggregation = None;
    let composed = composer.generate_base_query(std::slice::from_ref(&plain), false);
    if let Some(e) = composed.dropped.into_iter().next() {
        return Err(e);
    }
    let expr = composed
        .columns
        .first()
        .map(|c| c.expr.clone())
        .ok_or_else(|| CompositionError::Unsupported(format!("facet '{}' has no readable column", field.name)))?;
    let mut query = composed.query;
    query.clear_columns();
    Ok((query, expr))
}

/// `SELECT DISTINCT key AS entity_id` of root entities carrying an allowed value.
pub fn constraint_query(composer: &QueryComposer<'_>, field: &FieldDescriptor) -> Result<SelectQuery, CompositionError> {
    let (mut query, expr) = single_field(composer, field)?;
    query.set_distinct(true);
    query.select(Fragment::raw(composer.key_ref()), "entity_id");
    query.filter(value_predicate(field, &expr));
    Ok(query)
}

/// Value counts: `name` (binned for numeric facets with a bin size) and the
/// number of distinct root entities as `value`.
pub fn count_query(composer: &QueryComposer<'_>, field: &FieldDescriptor) -> Result<SelectQuery, CompositionError> {
    let (mut query, expr) = single_field(composer, field)?;
    let name = match field.bin_size.filter(|b| *b > 0.0) {
        Some(bin) => format!("FLOOR(CAST({} AS double precision) / {}) * {}", expr, bin, bin),
        None => expr.clone(),
    };
    query.select(Fragment::raw(name.clone()), "name");
    query.select(Fragment::raw(format!("COUNT(DISTINCT {})", composer.key_ref())), "value");
    query.filter(Fragment::raw(format!("{} IS NOT NULL", expr)));
    query.group_by(&name);
    if field.is_numeric() {
        query.order_by(Fragment::raw("\"name\" ASC"));
    } else {
        query.order_by(Fragment::raw("\"value\" DESC"));
        query.order_by(Fragment::raw("\"name\" ASC"));
    }
    Ok(query)
}
