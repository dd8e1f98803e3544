//! Raw catalog config types matching the JSON registry files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The closed set of list-capable entity models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Target,
    Disease,
    Ligand,
    Ortholog,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Target => "Target",
            ModelKind::Disease => "Disease",
            ModelKind::Ligand => "Ligand",
            ModelKind::Ortholog => "Ortholog",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Name used in field registrations (e.g. "Target").
    pub name: String,
    pub kind: ModelKind,
    pub root_table: String,
    /// Key column of the root table. Defaults to the introspected primary key.
    #[serde(default)]
    pub key_column: Option<String>,
    /// Column projected as `id` when the caller picks explicit fields.
    pub id_column: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Facet,
    List,
    Download,
    Overlap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Count,
    Max,
    Min,
    Avg,
    Sum,
}

impl Aggregation {
    pub fn apply(self, expr: &str) -> String {
        match self {
            Aggregation::Count => format!("COUNT(DISTINCT {})", expr),
            Aggregation::Max => format!("MAX({})", expr),
            Aggregation::Min => format!("MIN({})", expr),
            Aggregation::Avg => format!("CAST(AVG({}) AS double precision)", expr),
            Aggregation::Sum => format!("CAST(SUM({}) AS double precision)", expr),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Category,
    Numeric,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub model: String,
    #[serde(default)]
    pub associated_model: String,
    pub context: ContextType,
    #[serde(default)]
    pub list_name: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub table: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    /// SQL expression replacing `table.column`; `{alias}` expands to the joined table alias.
    #[serde(default)]
    pub select: Option<String>,
    /// Extra predicate on the field's table; `{alias}` expands like `select`.
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub group_method: Option<Aggregation>,
    #[serde(default)]
    pub type_modifier: Option<String>,
    #[serde(default)]
    pub value_kind: ValueKind,
    #[serde(default)]
    pub bin_size: Option<f64>,
    /// > 0 marks a default field, in ascending order.
    #[serde(default)]
    pub order: i32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeTableConfig {
    pub table: String,
    pub discriminator_column: String,
    /// Value column per discriminator value, used when a field names no column.
    #[serde(default)]
    pub value_columns: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequiredLinkConfig {
    pub from: String,
    pub to: String,
    pub via: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreferredLinkConfig {
    pub table: String,
    pub other_table: String,
    pub column: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    pub table: String,
    pub column: String,
    pub other_table: String,
    pub other_column: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnRefConfig {
    pub table: String,
    pub column: String,
}

/// Relationships and table classes that declared constraints do not express.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaOverrides {
    #[serde(default)]
    pub sparse_tables: Vec<String>,
    #[serde(default)]
    pub type_tables: Vec<TypeTableConfig>,
    #[serde(default)]
    pub required_links: Vec<RequiredLinkConfig>,
    #[serde(default)]
    pub preferred_links: Vec<PreferredLinkConfig>,
    #[serde(default)]
    pub extra_links: Vec<LinkConfig>,
    /// Numeric data stored in text columns; cast before numeric ordering.
    #[serde(default)]
    pub text_numeric_columns: Vec<ColumnRefConfig>,
}

fn required(from: &str, to: &str, via: &[&str]) -> RequiredLinkConfig {
    RequiredLinkConfig {
        from: from.into(),
        to: to.into(),
        via: via.iter().map(|s| s.to_string()).collect(),
    }
}

fn link(table: &str, column: &str, other_table: &str, other_column: &str) -> LinkConfig {
    LinkConfig {
        table: table.into(),
        column: column.into(),
        other_table: other_table.into(),
        other_column: other_column.into(),
    }
}

impl SchemaOverrides {
    /// Overrides for the knowledgebase schema, used when no
    /// `schema_overrides.json` is provided.
    pub fn knowledgebase_defaults() -> Self {
        let tdl_value_columns: HashMap<String, String> = [
            ("Ab Count", "integer_value"),
            ("MAb Count", "integer_value"),
            ("NCBI Gene PubMed Count", "integer_value"),
            ("EBI Total Patent Count", "integer_value"),
            ("ChEMBL First Reference Year", "integer_value"),
            ("JensenLab PubMed Score", "number_value"),
            ("PubTator Score", "number_value"),
            ("HPM Protein Tissue Specificity Index", "number_value"),
            ("HPM Gene Tissue Specificity Index", "number_value"),
            ("HPA Tissue Specificity Index", "number_value"),
            ("IMPC Clones", "string_value"),
            ("TMHMM Prediction", "string_value"),
            ("UniProt Function", "string_value"),
            ("ChEMBL Selective Compound", "string_value"),
            ("Experimental MF/BP Leaf Term GOA", "string_value"),
            ("Antibodypedia.com URL", "string_value"),
            ("IMPC Status", "string_value"),
            ("NCBI Gene Summary", "string_value"),
            ("Is Transcription Factor", "boolean_value"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        SchemaOverrides {
            sparse_tables: vec!["tinx_novelty".into()],
            type_tables: vec![TypeTableConfig {
                table: "tdl_info".into(),
                discriminator_column: "itype".into(),
                value_columns: tdl_value_columns,
            }],
            required_links: vec![
                required("protein", "target", &["t2tc"]),
                required("protein", "viral_protein", &["viral_ppi", "virus"]),
                required("protein", "virus", &["viral_ppi", "viral_protein"]),
                required("protein", "dto", &["p2dto"]),
                required("protein", "panther_class", &["p2pc"]),
                required("protein", "ncats_ligands", &["ncats_ligand_activity", "target", "t2tc"]),
                required("disease", "target", &["t2tc"]),
            ],
            preferred_links: vec![PreferredLinkConfig {
                table: "ncats_ppi".into(),
                other_table: "protein".into(),
                column: "protein_id".into(),
            }],
            extra_links: vec![
                link("disease", "protein_id", "t2tc", "protein_id"),
                link("t2tc", "protein_id", "protein", "id"),
                link("t2tc", "target_id", "target", "id"),
                link("ncats_ligand_activity", "target_id", "target", "id"),
                link("ncats_ligand_activity", "ncats_ligand_id", "ncats_ligands", "id"),
            ],
            text_numeric_columns: vec![ColumnRefConfig {
                table: "disease".into(),
                column: "pvalue".into(),
            }],
        }
    }
}

/// All catalog config in one struct for in-memory loading.
#[derive(Clone, Debug, Default)]
pub struct FullConfig {
    pub models: Vec<ModelConfig>,
    pub fields: Vec<FieldConfig>,
    pub schema: SchemaOverrides,
}
