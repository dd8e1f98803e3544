//! Per-model list behavior: identifier columns, association scoping and default sort.

use crate::config::ModelKind;
use crate::list::scope::ScopingMode;
use crate::sql::{column_ref, quoted, BindValue, Fragment, JoinKind, SelectQuery, SortDirection};

/// Default sort key: a projected output column or a column of the scoring subquery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    Output(&'static str),
    Scope(&'static str),
}

const STRUCTURE_LABEL_MAX: usize = 30;

/// `(SELECT id FROM protein WHERE ? IN (uniprot, sym, stringid) LIMIT 1)`
fn protein_lookup(target: &str) -> Fragment {
    Fragment::bound(
        "(SELECT \"lookup\".\"id\" FROM \"protein\" AS \"lookup\" \
         WHERE ? IN (\"lookup\".\"uniprot\", \"lookup\".\"sym\", \"lookup\".\"stringid\") LIMIT 1)",
        vec![BindValue::text(target)],
    )
}

fn ppi_filter(alias: &str, target: &str, ppi_confidence: f64) -> Fragment {
    let mut f = Fragment::raw(format!("{} = ", column_ref(alias, "other_id")));
    f.append(protein_lookup(target));
    f.push_sql(&format!(
        " AND NOT ({} = 'STRINGDB' AND {} < ",
        column_ref(alias, "ppitypes"),
        column_ref(alias, "score")
    ));
    f.push_param(BindValue::F64(ppi_confidence));
    f.push_sql(")");
    f
}

fn distinct_ids(table: &str, column: &str) -> SelectQuery {
    let mut q = SelectQuery::from_table(table);
    q.set_distinct(true);
    q.select(Fragment::raw(column_ref(table, column)), "entity_id");
    q
}

fn any_of(table: &str, columns: &[&str], values: &[String]) -> Fragment {
    Fragment::join(
        columns
            .iter()
            .map(|c| {
                Fragment::bound(
                    format!("{} = ANY(?)", column_ref(table, c)),
                    vec![BindValue::TextArray(values.to_vec())],
                )
            })
            .collect(),
        " OR ",
    )
}

impl ModelKind {
    /// Columns covered by the default full-text search.
    pub fn search_columns(self) -> &'static [&'static str] {
        match self {
            ModelKind::Target => &["uniprot", "sym", "stringid", "name", "description"],
            ModelKind::Disease => &["name", "description"],
            ModelKind::Ligand => &["identifier", "name"],
            ModelKind::Ortholog => &["symbol", "name", "species"],
        }
    }

    /// Identifier columns matched by a batch of names.
    pub fn batch_columns(self) -> &'static [&'static str] {
        match self {
            ModelKind::Target => &["uniprot", "sym", "stringid"],
            ModelKind::Disease => &["name"],
            ModelKind::Ligand => &["identifier", "name"],
            ModelKind::Ortholog => &["symbol"],
        }
    }

    /// Predicate on the root table selecting the entity named `value`.
    pub fn match_selector(self, root_table: &str, value: &str) -> Fragment {
        let cols: Vec<String> = self
            .batch_columns()
            .iter()
            .map(|c| column_ref(root_table, c))
            .collect();
        Fragment::bound(format!("? IN ({})", cols.join(", ")), vec![BindValue::text(value)])
    }

    /// `SELECT DISTINCT key AS entity_id FROM root WHERE <identifier> = ANY(batch)`
    pub fn batch_query(self, root_table: &str, key_column: &str, batch: &[String]) -> SelectQuery {
        let mut q = distinct_ids(root_table, key_column);
        q.filter(any_of(root_table, self.batch_columns(), batch));
        q
    }

    /// Table whose rows an association scope restricts, when this model joins one.
    pub fn association_table(self, scope: &ScopingMode) -> Option<&'static str> {
        match (self, scope) {
            (ModelKind::Target, ScopingMode::AssociatedTarget { .. }) => Some("ncats_ppi"),
            (ModelKind::Target, ScopingMode::AssociatedDisease(_)) => Some("disease"),
            (ModelKind::Target, ScopingMode::AssociatedLigand(_)) => Some("ncats_ligand_activity"),
            (ModelKind::Target, ScopingMode::AssociatedStructure(_)) => Some("predictor_results"),
            (ModelKind::Ligand, ScopingMode::AssociatedTarget { .. }) => Some("ncats_ligand_activity"),
            _ => None,
        }
    }

    /// Label shown as the modifier of facets read from the association table.
    pub fn association_label(scope: &ScopingMode) -> Option<String> {
        match scope {
            ScopingMode::AssociatedTarget { target, .. } => Some(target.clone()),
            ScopingMode::AssociatedDisease(d) => Some(d.clone()),
            ScopingMode::AssociatedLigand(l) => Some(l.clone()),
            ScopingMode::AssociatedStructure(s) if s.chars().count() > STRUCTURE_LABEL_MAX => {
                Some(format!("{}...", s.chars().take(STRUCTURE_LABEL_MAX).collect::<String>()))
            }
            ScopingMode::AssociatedStructure(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Predicate restricting the association table (joined under its own name).
    pub fn association_filter(self, scope: &ScopingMode) -> Option<Fragment> {
        let table = self.association_table(scope)?;
        let t = |c: &str| column_ref(table, c);
        match (self, scope) {
            (ModelKind::Target, ScopingMode::AssociatedTarget { target, ppi_confidence }) => {
                Some(ppi_filter(table, target, *ppi_confidence))
            }
            (ModelKind::Target, ScopingMode::AssociatedDisease(name)) => Some(Fragment::bound(
                format!(
                    "{} IN (SELECT \"ncats_p2da\".\"disease_assoc_id\" FROM \"ncats_p2da\" WHERE \"ncats_p2da\".\"name\" = ?)",
                    t("id")
                ),
                vec![BindValue::text(name)],
            )),
            (ModelKind::Target, ScopingMode::AssociatedLigand(ligand)) => Some(Fragment::bound(
                format!(
                    "{} = (SELECT \"ncats_ligands\".\"id\" FROM \"ncats_ligands\" WHERE \"ncats_ligands\".\"identifier\" = ? LIMIT 1)",
                    t("ncats_ligand_id")
                ),
                vec![BindValue::text(ligand)],
            )),
            (ModelKind::Target, ScopingMode::AssociatedStructure(smiles)) => Some(Fragment::bound(
                format!("{} = md5(?)", t("query_hash")),
                vec![BindValue::text(smiles)],
            )),
            (ModelKind::Ligand, ScopingMode::AssociatedTarget { target, .. }) => {
                let mut f = Fragment::raw(format!(
                    "{} IN (SELECT \"t2tc\".\"target_id\" FROM \"t2tc\" WHERE \"t2tc\".\"protein_id\" = ",
                    t("target_id")
                ));
                f.append(protein_lookup(target));
                f.push_sql(")");
                Some(f)
            }
            _ => None,
        }
    }

    /// Distinct root keys (`entity_id`) of the association scope; `None` when
    /// this model has no such association.
    pub fn association_id_query(self, scope: &ScopingMode, root_table: &str, key_column: &str) -> Option<SelectQuery> {
        match (self, scope) {
            (ModelKind::Target, ScopingMode::AssociatedTarget { .. }) => {
                let mut q = distinct_ids("ncats_ppi", "protein_id");
                q.filter(self.association_filter(scope)?);
                Some(q)
            }
            (ModelKind::Target, ScopingMode::AssociatedDisease(name)) => {
                let mut q = distinct_ids("ncats_p2da", "protein_id");
                q.filter(Fragment::bound(
                    format!("{} = ?", column_ref("ncats_p2da", "name")),
                    vec![BindValue::text(name)],
                ));
                Some(q)
            }
            (ModelKind::Target, ScopingMode::AssociatedLigand(ligand)) => {
                let mut q = distinct_ids("t2tc", "protein_id");
                q.join_table(
                    JoinKind::Inner,
                    "ncats_ligand_activity",
                    "ncats_ligand_activity",
                    Fragment::raw(format!(
                        "{} = {}",
                        column_ref("ncats_ligand_activity", "target_id"),
                        column_ref("t2tc", "target_id")
                    )),
                );
                q.join_table(
                    JoinKind::Inner,
                    "ncats_ligands",
                    "ncats_ligands",
                    Fragment::raw(format!(
                        "{} = {}",
                        column_ref("ncats_ligands", "id"),
                        column_ref("ncats_ligand_activity", "ncats_ligand_id")
                    )),
                );
                q.filter(Fragment::bound(
                    format!("{} = ?", column_ref("ncats_ligands", "identifier")),
                    vec![BindValue::text(ligand)],
                ));
                Some(q)
            }
            (ModelKind::Target, ScopingMode::AssociatedStructure(_)) => {
                let mut q = distinct_ids("predictor_results", "protein_id");
                q.filter(self.association_filter(scope)?);
                Some(q)
            }
            (ModelKind::Ligand, ScopingMode::AssociatedTarget { .. }) => {
                let mut q = distinct_ids("ncats_ligand_activity", "ncats_ligand_id");
                q.filter(self.association_filter(scope)?);
                Some(q)
            }
            (ModelKind::Disease | ModelKind::Ortholog, ScopingMode::AssociatedTarget { target, .. }) => {
                let mut q = distinct_ids(root_table, key_column);
                let mut f = Fragment::raw(format!("{} = ", column_ref(root_table, "protein_id")));
                f.append(protein_lookup(target));
                q.filter(f);
                Some(q)
            }
            _ => None,
        }
    }

    /// Model- and scope-specific default order. The root key tiebreaker is added by
    /// the caller; with explicit fields it is the only order.
    pub fn default_sort(self, scope: &ScopingMode, explicit_fields: bool) -> Vec<(SortKey, SortDirection)> {
        use SortDirection::{Asc, Desc};
        if explicit_fields {
            return Vec::new();
        }
        match (self, scope) {
            (_, ScopingMode::Term(_)) => vec![(SortKey::Scope("score"), Desc), (SortKey::Output("name"), Asc)],
            (_, ScopingMode::Similarity { .. }) => vec![(SortKey::Scope("jaccard"), Desc)],
            (ModelKind::Target, ScopingMode::AssociatedTarget { .. }) => {
                vec![(SortKey::Output("p_int"), Desc), (SortKey::Output("score"), Desc)]
            }
            (ModelKind::Target, ScopingMode::AssociatedDisease(_)) => vec![(SortKey::Output("datasource_count"), Desc)],
            (ModelKind::Target, ScopingMode::AssociatedLigand(_)) => vec![(SortKey::Output("avgActVal"), Desc)],
            (ModelKind::Target, ScopingMode::AssociatedStructure(_)) => vec![(SortKey::Output("result"), Desc)],
            (ModelKind::Target, _) => vec![(SortKey::Output("novelty"), Desc)],
            (ModelKind::Disease, _) => vec![(SortKey::Output("Associated Target Count"), Desc)],
            (ModelKind::Ligand, ScopingMode::AssociatedTarget { .. }) => vec![(SortKey::Output("avgActVal"), Desc)],
            (ModelKind::Ligand, _) => vec![(SortKey::Output("actcnt"), Desc)],
            (ModelKind::Ortholog, _) => Vec::new(),
        }
    }
}

impl SortKey {
    pub fn render(self, direction: SortDirection) -> String {
        match self {
            SortKey::Output(alias) => format!("{} {} NULLS LAST", quoted(alias), direction.keyword()),
            SortKey::Scope(col) => format!(
                "{} {} NULLS LAST",
                column_ref(crate::catalog::SCOPE_QUERY_ALIAS, col),
                direction.keyword()
            ),
        }
    }
}
