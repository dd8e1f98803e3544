//! Expression observations rolled up over the anatomy ontology.

use crate::sql::{column_ref, union, BindValue, Fragment, JoinKind, QueryBuf, SelectQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Ancestor excluded from every tree ("cell").
const EXCLUDED_ANCESTOR: &str = "GO:0005623";

/// One table of per-entity scored observations keyed by ontology term.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationSource {
    pub table: String,
    pub id_prefix: String,
    /// SQL for the observation kind, e.g. a literal label or a column.
    pub kind_sql: String,
    pub value_sql: String,
}

impl ObservationSource {
    pub fn gtex() -> Self {
        ObservationSource {
            table: "gtex".into(),
            id_prefix: "gtex-".into(),
            kind_sql: "'GTEx'".into(),
            value_sql: column_ref("gtex", "tpm_rank"),
        }
    }

    pub fn expression() -> Self {
        ObservationSource {
            table: "expression".into(),
            id_prefix: "expression-".into(),
            kind_sql: column_ref("expression", "etype"),
            value_sql: format!(
                "coalesce({}, {} / 5)",
                column_ref("expression", "source_rank"),
                column_ref("expression", "number_value")
            ),
        }
    }

    fn query(&self, entity_id: i64) -> SelectQuery {
        let t = self.table.as_str();
        let ancestry = "uberon_ancestry";
        let mut q = SelectQuery::from_table(t);
        q.select(
            Fragment::raw(format!("concat('{}', {})", self.id_prefix.replace('\'', "''"), column_ref(t, "id"))),
            "id",
        );
        q.select(Fragment::raw(self.kind_sql.clone()), "etype");
        q.select(Fragment::raw(format!("CAST({} AS double precision)", self.value_sql)), "value");
        q.select(Fragment::raw(column_ref(t, "uberon_id")), "uberon_id");
        q.select(Fragment::raw(column_ref("direct", "name")), "direct_name");
        q.select(Fragment::raw(column_ref("direct_parent", "parent_id")), "direct_parent");
        q.select(Fragment::raw(column_ref(ancestry, "ancestor_uberon_id")), "ancestor_uberon_id");
        q.select(Fragment::raw(column_ref("ancestor", "name")), "ancestor_name");
        q.select(Fragment::raw(column_ref("ancestor_parent", "parent_id")), "ancestor_parent");

        let on = |left: String, right: String| Fragment::raw(format!("{} = {}", left, right));
        q.join_table(
            JoinKind::Inner,
            ancestry,
            ancestry,
            on(column_ref(ancestry, "uberon_id"), column_ref(t, "uberon_id")),
        );
        q.join_table(JoinKind::Inner, "uberon", "direct", on(column_ref("direct", "uid"), column_ref(t, "uberon_id")));
        q.join_table(
            JoinKind::Inner,
            "uberon",
            "ancestor",
            on(column_ref("ancestor", "uid"), column_ref(ancestry, "ancestor_uberon_id")),
        );
        q.join_table(
            JoinKind::Inner,
            "uberon_parent",
            "direct_parent",
            on(column_ref("direct_parent", "uid"), column_ref(t, "uberon_id")),
        );
        q.join_table(
            JoinKind::Inner,
            "uberon_parent",
            "ancestor_parent",
            on(column_ref("ancestor_parent", "uid"), column_ref(ancestry, "ancestor_uberon_id")),
        );
        q.filter(Fragment::bound(
            format!("{} = ?", column_ref(t, "protein_id")),
            vec![BindValue::I64(entity_id)],
        ));
        q.filter(Fragment::bound(
            format!("{} <> ?", column_ref(ancestry, "ancestor_uberon_id")),
            vec![BindValue::text(EXCLUDED_ANCESTOR)],
        ));
        q
    }
}

/// One observation joined to its term and one of the term's ancestors.
#[derive(Clone, Debug, Deserialize)]
pub struct ObservationRow {
    pub id: String,
    #[serde(default)]
    pub etype: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    pub uberon_id: String,
    pub direct_name: String,
    #[serde(default)]
    pub direct_parent: Option<String>,
    pub ancestor_uberon_id: String,
    pub ancestor_name: String,
    #[serde(default)]
    pub ancestor_parent: Option<String>,
}

impl ObservationRow {
    pub fn from_json(row: &Value) -> Option<Self> {
        serde_json::from_value(row.clone()).ok()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OntologyNode {
    pub uid: String,
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub direct: bool,
    /// Direct observations by source id.
    #[serde(skip)]
    pub observed: BTreeMap<String, f64>,
    pub parents: Vec<String>,
    pub children: Vec<OntologyNode>,
}

#[derive(Default)]
struct Term {
    name: String,
    observed: BTreeMap<String, f64>,
    parents: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct HierarchyAggregator {
    sources: Vec<ObservationSource>,
}

impl Default for HierarchyAggregator {
    fn default() -> Self {
        HierarchyAggregator {
            sources: vec![ObservationSource::gtex(), ObservationSource::expression()],
        }
    }
}

impl HierarchyAggregator {
    pub fn new(sources: Vec<ObservationSource>) -> Self {
        HierarchyAggregator { sources }
    }

    /// Observations of every source for one entity, as a UNION.
    pub fn query(&self, entity_id: i64) -> QueryBuf {
        let parts: Vec<SelectQuery> = self.sources.iter().map(|s| s.query(entity_id)).collect();
        union(&parts)
    }

    /// Root terms with their rolled-up, collapsed subtrees.
    pub fn build(&self, rows: &[ObservationRow]) -> Vec<OntologyNode> {
        let mut terms: BTreeMap<String, Term> = BTreeMap::new();
        for row in rows {
            let value = match row.value {
                Some(v) if v > 0.0 => v,
                _ => continue,
            };
            let direct = terms.entry(row.uberon_id.clone()).or_insert_with(|| Term {
                name: row.direct_name.clone(),
                ..Default::default()
            });
            direct.observed.entry(row.id.clone()).or_insert(value);
            add_parent(direct, row.direct_parent.as_deref());
            let ancestor = terms.entry(row.ancestor_uberon_id.clone()).or_insert_with(|| Term {
                name: row.ancestor_name.clone(),
                ..Default::default()
            });
            add_parent(ancestor, row.ancestor_parent.as_deref());
        }

        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut non_roots: BTreeSet<&str> = BTreeSet::new();
        for (uid, term) in &terms {
            for parent in &term.parents {
                if parent != uid && terms.contains_key(parent) {
                    children.entry(parent.as_str()).or_default().push(uid.as_str());
                    non_roots.insert(uid.as_str());
                }
            }
        }

        let mut roots = Vec::new();
        for uid in terms.keys().filter(|u| !non_roots.contains(u.as_str())) {
            let mut path = Vec::new();
            let mut node = materialize(uid, &terms, &children, &mut path);
            trim(&mut node);
            roots.push(node);
        }
        tracing::debug!(terms = terms.len(), roots = roots.len(), "ontology tree built");
        roots
    }
}

fn add_parent(term: &mut Term, parent: Option<&str>) {
    if let Some(p) = parent.filter(|p| !p.is_empty()) {
        if !term.parents.iter().any(|e| e == p) {
            term.parents.push(p.to_string());
        }
    }
}

/// Builds the subtree under `uid`; a term with several parents is copied under
/// each. `path` guards against cycles.
fn materialize<'t>(
    uid: &'t str,
    terms: &'t BTreeMap<String, Term>,
    children: &BTreeMap<&'t str, Vec<&'t str>>,
    path: &mut Vec<&'t str>,
) -> OntologyNode {
    path.push(uid);
    let term = &terms[uid];
    let next: Vec<&'t str> = children
        .get(uid)
        .map(|c| c.as_slice())
        .unwrap_or(&[])
        .iter()
        .copied()
        .filter(|c| !path.contains(c))
        .collect();
    let mut kids: Vec<OntologyNode> = next
        .into_iter()
        .map(|c| materialize(c, terms, children, path))
        .collect();
    path.pop();

    let direct_max = term.observed.values().copied().fold(None, |m: Option<f64>, v| Some(m.map_or(v, |m| m.max(v))));
    if let (Some(max), false) = (direct_max, kids.is_empty()) {
        kids.push(OntologyNode {
            uid: uid.to_string(),
            name: format!("{} (direct)", term.name),
            value: max,
            direct: true,
            observed: BTreeMap::new(),
            parents: Vec::new(),
            children: Vec::new(),
        });
    }
    let value = kids
        .iter()
        .map(|k| k.value)
        .chain(direct_max)
        .fold(0.0_f64, f64::max);
    OntologyNode {
        uid: uid.to_string(),
        name: term.name.clone(),
        value,
        direct: false,
        observed: term.observed.clone(),
        parents: term.parents.clone(),
        children: kids,
    }
}

/// Collapse to a fixed point: drop empty zero-valued children, lift the only
/// child of a data-less child, then remove duplicate (name, uid) siblings,
/// keeping the last of each.
fn trim(node: &mut OntologyNode) {
    let mut changed = true;
    while changed {
        changed = false;
        let mut i = node.children.len();
        while i > 0 {
            i -= 1;
            let child = &mut node.children[i];
            if child.children.is_empty() && child.value == 0.0 {
                node.children.remove(i);
                changed = true;
                continue;
            }
            trim(child);
            if child.observed.is_empty() && !child.direct && child.children.len() == 1 {
                let only = child.children.remove(0);
                node.children[i] = only;
                trim(&mut node.children[i]);
                changed = true;
            }
        }
    }
    let mut seen = BTreeSet::new();
    let mut kept: Vec<OntologyNode> = node
        .children
        .drain(..)
        .rev()
        .filter(|c| seen.insert((c.name.clone(), c.uid.clone())))
        .collect();
    kept.reverse();
    node.children = kept;
}
