//! Config validation: referential integrity between models, fields and overrides.

use crate::config::FullConfig;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

/// Plain SQL identifier: table and column names in the config must match.
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn check_identifier(re: &Regex, what: &str, name: &str) -> Result<(), ConfigError> {
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{} '{}' is not a plain identifier", what, name)))
    }
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let ident = Regex::new(IDENTIFIER_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut model_names = HashSet::new();
    for m in &config.models {
        if !model_names.insert(m.name.as_str()) {
            return Err(ConfigError::DuplicateModel(m.name.clone()));
        }
        if m.root_table.is_empty() {
            return Err(ConfigError::Validation(format!("model {} has no root table", m.name)));
        }
        check_identifier(&ident, "root table", &m.root_table)?;
        check_identifier(&ident, "id column", &m.id_column)?;
        if let Some(key) = &m.key_column {
            check_identifier(&ident, "key column", key)?;
        }
    }

    let type_tables: HashSet<&str> = config.schema.type_tables.iter().map(|t| t.table.as_str()).collect();

    for f in &config.fields {
        if !model_names.contains(f.model.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "model",
                id: f.model.clone(),
            });
        }
        if !f.associated_model.is_empty() && !model_names.contains(f.associated_model.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "associated model",
                id: f.associated_model.clone(),
            });
        }
        check_identifier(&ident, "table", &f.table)?;
        if let Some(column) = &f.column {
            check_identifier(&ident, "column", column)?;
        }
        if f.column.is_none() && f.select.is_none() && !type_tables.contains(f.table.as_str()) {
            return Err(ConfigError::Validation(format!(
                "field '{}' ({}) needs a column or a select expression",
                f.name, f.model
            )));
        }
        if let Some(bin) = f.bin_size {
            if !(bin > 0.0) {
                return Err(ConfigError::Validation(format!("field '{}' has a non-positive bin size", f.name)));
            }
        }
    }

    for r in &config.schema.required_links {
        if r.from == r.to {
            return Err(ConfigError::Validation(format!("required link {0}-{0} links a table to itself", r.from)));
        }
        if r.via.is_empty() {
            return Err(ConfigError::Validation(format!(
                "required link {}-{} lists no intermediate tables",
                r.from, r.to
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextType, FieldConfig, ModelConfig, ModelKind, SchemaOverrides, ValueKind};

    fn model(name: &str) -> ModelConfig {
        ModelConfig {
            name: name.into(),
            kind: ModelKind::Target,
            root_table: "protein".into(),
            key_column: None,
            id_column: "uniprot".into(),
        }
    }

    fn field(model: &str, column: Option<&str>) -> FieldConfig {
        FieldConfig {
            model: model.into(),
            associated_model: String::new(),
            context: ContextType::Facet,
            list_name: String::new(),
            name: "Family".into(),
            description: String::new(),
            table: "target".into(),
            column: column.map(String::from),
            alias: None,
            select: None,
            where_clause: None,
            group_method: None,
            type_modifier: None,
            value_kind: ValueKind::Category,
            bin_size: None,
            order: 0,
        }
    }

    #[test]
    fn rejects_duplicate_models() {
        let config = FullConfig {
            models: vec![model("Target"), model("Target")],
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(ConfigError::DuplicateModel(_))));
    }

    #[test]
    fn rejects_field_for_unknown_model() {
        let config = FullConfig {
            models: vec![model("Target")],
            fields: vec![field("Disease", Some("fam"))],
            ..Default::default()
        };
        assert!(matches!(validate(&config), Err(ConfigError::MissingReference { kind: "model", .. })));
    }

    #[test]
    fn type_table_fields_may_omit_column() {
        let mut f = field("Target", None);
        f.table = "tdl_info".into();
        let config = FullConfig {
            models: vec![model("Target")],
            fields: vec![f],
            schema: SchemaOverrides::knowledgebase_defaults(),
        };
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn default_overrides_are_valid() {
        let config = FullConfig {
            models: vec![model("Target")],
            fields: vec![field("Target", Some("fam"))],
            schema: SchemaOverrides::knowledgebase_defaults(),
        };
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_non_identifier_columns() {
        let config = FullConfig {
            models: vec![model("Target")],
            fields: vec![field("Target", Some("fam; drop table x"))],
            schema: SchemaOverrides::knowledgebase_defaults(),
        };
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }
}
