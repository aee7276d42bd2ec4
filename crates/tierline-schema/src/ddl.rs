//! DDL text generation
//!
//! Pure functions from dictionary tables to schema statements. Nothing here
//! touches a database; a DDL sink decides what to do with the text.

use serde::Serialize;
use sha2::{Digest, Sha256};

use tierline_core::{DdlConfig, Field, Layer, SchemaDictionary, Table};

use crate::storage::infer_storage_type;

/// Generated DDL for one layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerDdl {
    pub layer: Layer,

    /// Statement text
    pub sql: String,

    /// SHA-256 of `sql`, hex encoded
    pub fingerprint: String,

    /// Tables skipped because they have no fields
    pub empty_tables: Vec<String>,
}

/// DDL for every layer of a dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdlBundle {
    pub layers: Vec<LayerDdl>,
}

impl DdlBundle {
    pub fn layer(&self, layer: Layer) -> Option<&LayerDdl> {
        self.layers.iter().find(|l| l.layer == layer)
    }
}

/// Renders tables into CREATE / ALTER / DROP statements
#[derive(Debug, Clone, Default)]
pub struct DdlGenerator {
    options: DdlConfig,
}

impl DdlGenerator {
    pub fn new(options: DdlConfig) -> Self {
        Self { options }
    }

    /// Schema name for a layer (`l1`, `l2`, `l3`)
    pub fn schema_name(layer: Layer) -> String {
        layer.as_str().to_lowercase()
    }

    /// Table name as referenced in statements
    pub fn qualified(&self, layer: Layer, table: &str) -> String {
        if self.options.schema_per_layer {
            format!("{}.{}", Self::schema_name(layer), table)
        } else {
            table.to_string()
        }
    }

    fn if_not_exists(&self) -> &'static str {
        if self.options.if_not_exists {
            "IF NOT EXISTS "
        } else {
            ""
        }
    }

    fn if_exists(&self) -> &'static str {
        if self.options.if_not_exists {
            "IF EXISTS "
        } else {
            ""
        }
    }

    fn column_definition(field: &Field) -> String {
        let (storage, _) = infer_storage_type(field);
        if field.is_primary_key() {
            format!("{} {} NOT NULL", field.name, storage)
        } else {
            format!("{} {}", field.name, storage)
        }
    }

    /// CREATE TABLE statement for one table
    ///
    /// Primary key fields are NOT NULL and always collected into a trailing
    /// PRIMARY KEY clause, even when there is only one. A table without
    /// fields yields an explanatory comment instead of a statement.
    pub fn create_table(&self, table: &Table) -> String {
        let name = self.qualified(table.layer(), table.name());

        if table.fields().is_empty() {
            tracing::debug!(table = %name, "table has no fields, skipping CREATE TABLE");
            return format!("-- {}: no fields defined, CREATE TABLE skipped\n", name);
        }

        let mut lines: Vec<String> = table
            .fields()
            .iter()
            .map(|f| format!("    {}", Self::column_definition(f)))
            .collect();

        let keys: Vec<&str> = table.primary_key().iter().map(|f| f.name.as_str()).collect();
        if !keys.is_empty() {
            lines.push(format!("    PRIMARY KEY ({})", keys.join(", ")));
        }

        format!(
            "CREATE TABLE {}{} (\n{}\n);\n",
            self.if_not_exists(),
            name,
            lines.join(",\n")
        )
    }

    /// ALTER TABLE statement adding one column
    pub fn add_column(&self, table: &Table, field: &Field) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}{};\n",
            self.qualified(table.layer(), table.name()),
            self.if_not_exists(),
            Self::column_definition(field)
        )
    }

    pub fn drop_column(&self, table: &Table, field: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}{};\n",
            self.qualified(table.layer(), table.name()),
            self.if_exists(),
            field
        )
    }

    /// ALTER TABLE statement moving a column to its inferred storage type
    pub fn alter_column_type(&self, table: &Table, field: &Field) -> String {
        let (storage, _) = infer_storage_type(field);
        format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {};\n",
            self.qualified(table.layer(), table.name()),
            field.name,
            storage
        )
    }

    /// Statements replacing a table's primary key with its current key fields
    ///
    /// The existing constraint is assumed to carry the default `<table>_pkey` name.
    pub fn replace_primary_key(&self, table: &Table) -> String {
        let name = self.qualified(table.layer(), table.name());
        let keys = table.primary_key();

        let mut sql = format!(
            "ALTER TABLE {} DROP CONSTRAINT {}{}_pkey;\n",
            name,
            self.if_exists(),
            table.name()
        );
        for key in &keys {
            sql.push_str(&format!("ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;\n", name, key.name));
        }
        if !keys.is_empty() {
            let columns: Vec<&str> = keys.iter().map(|f| f.name.as_str()).collect();
            sql.push_str(&format!("ALTER TABLE {} ADD PRIMARY KEY ({});\n", name, columns.join(", ")));
        }
        sql
    }

    /// DROP TABLE statements in the given order
    pub fn drop_tables(&self, dictionary: &SchemaDictionary, order: &[String]) -> String {
        order
            .iter()
            .filter_map(|name| dictionary.table(name))
            .map(|t| format!("DROP TABLE {}{};\n", self.if_exists(), self.qualified(t.layer(), t.name())))
            .collect()
    }

    /// Foreign key statements for relationships owned by tables of `layer`
    ///
    /// Relationships that do not resolve are rendered as comments so the
    /// problem stays visible in the generated file.
    pub fn foreign_keys(&self, dictionary: &SchemaDictionary, layer: Layer) -> Vec<String> {
        dictionary
            .relationships()
            .iter()
            .filter(|r| r.from_layer == layer)
            .map(|r| {
                let source_ok = dictionary.resolve(r.from_layer, &r.from_table, &r.from_field).is_some();
                let target_ok = dictionary.resolve(r.to_layer, &r.to_table, &r.to_field).is_some();

                if source_ok && target_ok {
                    format!(
                        "ALTER TABLE {} ADD CONSTRAINT fk_{}_{} FOREIGN KEY ({}) REFERENCES {} ({});\n",
                        self.qualified(r.from_layer, &r.from_table),
                        r.from_table,
                        r.from_field,
                        r.from_field,
                        self.qualified(r.to_layer, &r.to_table),
                        r.to_field
                    )
                } else {
                    format!("-- unresolved relationship skipped: {}\n", r.describe())
                }
            })
            .collect()
    }

    /// Full DDL for one layer: schema, tables, then foreign keys
    pub fn layer_ddl(&self, dictionary: &SchemaDictionary, layer: Layer) -> LayerDdl {
        let mut sql = String::new();
        let mut empty_tables = Vec::new();

        sql.push_str(&format!("-- {} tables\n", layer));
        if self.options.schema_per_layer {
            sql.push_str(&format!(
                "CREATE SCHEMA {}{};\n",
                self.if_not_exists(),
                Self::schema_name(layer)
            ));
        }

        for table in dictionary.tables_in(layer) {
            if table.fields().is_empty() {
                empty_tables.push(table.name().to_string());
            }
            sql.push('\n');
            sql.push_str(&self.create_table(table));
        }

        if self.options.foreign_keys {
            let constraints = self.foreign_keys(dictionary, layer);
            if !constraints.is_empty() {
                sql.push('\n');
                for statement in constraints {
                    sql.push_str(&statement);
                }
            }
        }

        LayerDdl {
            layer,
            fingerprint: fingerprint(&sql),
            sql,
            empty_tables,
        }
    }

    /// DDL for all three layers
    pub fn generate(&self, dictionary: &SchemaDictionary) -> DdlBundle {
        DdlBundle {
            layers: Layer::ALL.iter().map(|l| self.layer_ddl(dictionary, *l)).collect(),
        }
    }
}

/// Hex SHA-256 of statement text
pub fn fingerprint(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tierline_core::Relationship;

    fn snapshot() -> Table {
        Table::new(
            "facility_exposure_snapshot",
            Layer::L2,
            "exposure",
            vec![
                Field::new("facility_id").primary_key(),
                Field::new("as_of_date").primary_key(),
                Field::new("gross_exposure_usd"),
                Field::new("is_active_flag"),
                Field::new("drawn_amount").with_data_type("decimal(18,2)"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn create_table_with_composite_key() {
        let sql = DdlGenerator::default().create_table(&snapshot());
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS l2.facility_exposure_snapshot (\n\
             \x20   facility_id VARCHAR(64) NOT NULL,\n\
             \x20   as_of_date DATE NOT NULL,\n\
             \x20   gross_exposure_usd NUMERIC(20,4),\n\
             \x20   is_active_flag BOOLEAN,\n\
             \x20   drawn_amount NUMERIC(18,2),\n\
             \x20   PRIMARY KEY (facility_id, as_of_date)\n\
             );\n"
        );
    }

    #[test]
    fn single_key_still_gets_primary_key_clause() {
        let table = Table::new("counterparty", Layer::L1, "ref", vec![Field::new("counterparty_id").primary_key()]).unwrap();
        let sql = DdlGenerator::default().create_table(&table);
        assert!(sql.contains("PRIMARY KEY (counterparty_id)"));
    }

    #[test]
    fn zero_field_table_emits_comment() {
        let table = Table::new("placeholder", Layer::L3, "derived", vec![]).unwrap();
        let sql = DdlGenerator::default().create_table(&table);
        assert!(sql.starts_with("--"));
        assert!(!sql.contains("CREATE TABLE"));
    }

    #[test]
    fn generation_is_deterministic() {
        let mut dict = SchemaDictionary::new();
        dict.add_table(snapshot()).unwrap();
        let generator = DdlGenerator::default();

        let first = generator.generate(&dict);
        let second = generator.generate(&dict);
        assert_eq!(first, second);
        assert_eq!(first.layer(Layer::L2).unwrap().fingerprint.len(), 64);
    }

    #[test]
    fn options_control_guards_and_qualification() {
        let generator = DdlGenerator::new(DdlConfig {
            if_not_exists: false,
            foreign_keys: false,
            schema_per_layer: false,
        });
        let sql = generator.create_table(&snapshot());
        assert!(sql.starts_with("CREATE TABLE facility_exposure_snapshot ("));

        let alter = generator.add_column(&snapshot(), &Field::new("spread_bps"));
        assert_eq!(alter, "ALTER TABLE facility_exposure_snapshot ADD COLUMN spread_bps NUMERIC(10,4);\n");
    }

    #[test]
    fn layer_ddl_includes_foreign_keys_and_flags_dangling_ones() {
        let mut dict = SchemaDictionary::new();
        dict.add_table(Table::new("facility", Layer::L1, "ref", vec![Field::new("facility_id").primary_key()]).unwrap())
            .unwrap();
        dict.add_table(snapshot()).unwrap();
        dict.add_relationship(Relationship::new(
            (Layer::L2, "facility_exposure_snapshot", "facility_id"),
            (Layer::L1, "facility", "facility_id"),
        ))
        .unwrap();
        dict.push_relationship_unchecked(Relationship::new(
            (Layer::L2, "facility_exposure_snapshot", "desk_id"),
            (Layer::L1, "desk", "desk_id"),
        ));

        let ddl = DdlGenerator::default().layer_ddl(&dict, Layer::L2);
        assert!(ddl.sql.contains("CREATE SCHEMA IF NOT EXISTS l2;"));
        assert!(ddl.sql.contains(
            "ALTER TABLE l2.facility_exposure_snapshot ADD CONSTRAINT fk_facility_exposure_snapshot_facility_id \
             FOREIGN KEY (facility_id) REFERENCES l1.facility (facility_id);"
        ));
        assert!(ddl.sql.contains("-- unresolved relationship skipped: L2.facility_exposure_snapshot.desk_id"));
    }

    #[test]
    fn column_type_and_key_changes() {
        let generator = DdlGenerator::default();
        let table = snapshot();

        assert_eq!(
            generator.alter_column_type(&table, &Field::new("drawn_amt")),
            "ALTER TABLE l2.facility_exposure_snapshot ALTER COLUMN drawn_amt TYPE NUMERIC(20,4);\n"
        );
        assert_eq!(
            generator.replace_primary_key(&table),
            "ALTER TABLE l2.facility_exposure_snapshot DROP CONSTRAINT IF EXISTS facility_exposure_snapshot_pkey;\n\
             ALTER TABLE l2.facility_exposure_snapshot ALTER COLUMN facility_id SET NOT NULL;\n\
             ALTER TABLE l2.facility_exposure_snapshot ALTER COLUMN as_of_date SET NOT NULL;\n\
             ALTER TABLE l2.facility_exposure_snapshot ADD PRIMARY KEY (facility_id, as_of_date);\n"
        );
    }

    #[test]
    fn drop_tables_follows_given_order() {
        let mut dict = SchemaDictionary::new();
        dict.add_table(snapshot()).unwrap();
        dict.add_table(Table::new("facility", Layer::L1, "ref", vec![Field::new("facility_id")]).unwrap())
            .unwrap();

        let sql = DdlGenerator::default().drop_tables(
            &dict,
            &["facility_exposure_snapshot".to_string(), "facility".to_string()],
        );
        assert_eq!(
            sql,
            "DROP TABLE IF EXISTS l2.facility_exposure_snapshot;\nDROP TABLE IF EXISTS l1.facility;\n"
        );
    }
}
