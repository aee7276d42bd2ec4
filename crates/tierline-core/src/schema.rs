//! Schema dictionary types
//!
//! Tables are grouped by layer, carry their fields, and are linked by
//! relationships. Records are validated on construction (including serde
//! deserialization), so a `Table` in hand always has unique field names.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::derivation::DerivationDag;
use crate::error::{ReferentialError, ValidationError};

/// Data layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// Reference / master data
    L1,

    /// Time-series snapshots and events
    L2,

    /// Derived metrics and roll-ups
    L3,
}

impl Layer {
    /// All layers in dependency order
    pub const ALL: [Layer; 3] = [Layer::L1, Layer::L2, Layer::L3];

    /// Stable tag used in documents and narratives
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
            Self::L3 => "L3",
        }
    }

    /// Parse a layer tag (case-insensitive)
    pub fn from_tag(tag: &str) -> Result<Self, ValidationError> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "L1" => Ok(Self::L1),
            "L2" => Ok(Self::L2),
            "L3" => Ok(Self::L3),
            _ => Err(ValidationError::UnknownLayer(tag.to_string())),
        }
    }

    /// Whether fields of this layer may feed a metric directly
    pub fn is_source_layer(&self) -> bool {
        matches!(self, Self::L1 | Self::L2)
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target of a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FkTarget {
    pub layer: Layer,
    pub table: String,
    pub field: String,
}

/// Key constraints on a field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkFk {
    /// Part of the (possibly composite) primary key
    #[serde(default)]
    pub is_pk: bool,

    /// Foreign key target, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_target: Option<FkTarget>,
}

/// A column of a dictionary table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,

    /// Declared storage type, if the modeller gave one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk_fk: Option<PkFk>,

    /// Derivation formula for L3 fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    /// `layer.table.field` references the formula reads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Field {
    /// Create a field with only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            pk_fk: None,
            formula: None,
            source_fields: Vec::new(),
            grain: None,
            description: None,
        }
    }

    /// Set the declared storage type
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Mark as part of the primary key
    pub fn primary_key(mut self) -> Self {
        self.pk_fk.get_or_insert_with(PkFk::default).is_pk = true;
        self
    }

    /// Declare a foreign key target
    pub fn references(mut self, layer: Layer, table: impl Into<String>, field: impl Into<String>) -> Self {
        self.pk_fk.get_or_insert_with(PkFk::default).fk_target = Some(FkTarget {
            layer,
            table: table.into(),
            field: field.into(),
        });
        self
    }

    /// Set the derivation formula
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Set the grain description
    pub fn with_grain(mut self, grain: impl Into<String>) -> Self {
        self.grain = Some(grain.into());
        self
    }

    /// Whether this field is part of the primary key
    pub fn is_primary_key(&self) -> bool {
        self.pk_fk.as_ref().map(|k| k.is_pk).unwrap_or(false)
    }
}

/// Unvalidated table shape as it appears in documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub name: String,

    /// Optional inside a layer-grouped document; filled from the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub fields: Vec<Field>,
}

/// A dictionary table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableRecord", into = "TableRecord")]
pub struct Table {
    name: String,
    layer: Layer,
    category: String,
    fields: Vec<Field>,
}

impl Table {
    /// Build a table, rejecting empty names and duplicate field names
    pub fn new(
        name: impl Into<String>,
        layer: Layer,
        category: impl Into<String>,
        fields: Vec<Field>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyTableName);
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(ValidationError::EmptyFieldName { table: name });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ValidationError::DuplicateField {
                    table: name,
                    field: field.name.clone(),
                });
            }
        }

        Ok(Self {
            name,
            layer,
            category: category.into(),
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary key fields in declaration order
    pub fn primary_key(&self) -> Vec<&Field> {
        self.fields.iter().filter(|f| f.is_primary_key()).collect()
    }

    /// Append a field, keeping names unique
    pub fn add_field(&mut self, field: Field) -> Result<(), ValidationError> {
        if field.name.trim().is_empty() {
            return Err(ValidationError::EmptyFieldName {
                table: self.name.clone(),
            });
        }
        if self.field(&field.name).is_some() {
            return Err(ValidationError::DuplicateField {
                table: self.name.clone(),
                field: field.name,
            });
        }
        self.fields.push(field);
        Ok(())
    }

    /// `layer.table` display form
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.layer, self.name)
    }
}

impl TryFrom<TableRecord> for Table {
    type Error = ValidationError;

    fn try_from(record: TableRecord) -> Result<Self, Self::Error> {
        let layer = record
            .layer
            .ok_or_else(|| ValidationError::UnknownLayer(format!("<missing for {}>", record.name)))?;
        Table::new(record.name, layer, record.category, record.fields)
    }
}

impl From<Table> for TableRecord {
    fn from(table: Table) -> Self {
        Self {
            name: table.name,
            layer: Some(table.layer),
            category: table.category,
            fields: table.fields,
        }
    }
}

/// A field-level link between two tables
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub from_layer: Layer,
    pub from_table: String,
    pub from_field: String,
    pub to_layer: Layer,
    pub to_table: String,
    pub to_field: String,
}

impl Relationship {
    pub fn new(
        from: (Layer, &str, &str),
        to: (Layer, &str, &str),
    ) -> Self {
        Self {
            from_layer: from.0,
            from_table: from.1.to_string(),
            from_field: from.2.to_string(),
            to_layer: to.0,
            to_table: to.1.to_string(),
            to_field: to.2.to_string(),
        }
    }

    /// `L2.a.x -> L1.b.y`
    pub fn describe(&self) -> String {
        format!(
            "{}.{}.{} -> {}.{}.{}",
            self.from_layer, self.from_table, self.from_field, self.to_layer, self.to_table, self.to_field
        )
    }
}

/// Layer-grouped document shape used by dictionary stores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DictionaryDocument {
    #[serde(rename = "L1", default)]
    pub l1: Vec<TableRecord>,

    #[serde(rename = "L2", default)]
    pub l2: Vec<TableRecord>,

    #[serde(rename = "L3", default)]
    pub l3: Vec<TableRecord>,

    #[serde(default)]
    pub relationships: Vec<Relationship>,

    #[serde(default)]
    pub derivation_dag: DerivationDag,
}

/// Snapshot of all tables, relationships and the L3 derivation DAG
///
/// Operations elsewhere take a `&SchemaDictionary` and are pure functions of
/// it. Mutations go through the explicit methods below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DictionaryDocument", into = "DictionaryDocument")]
pub struct SchemaDictionary {
    tables: Vec<Table>,
    relationships: Vec<Relationship>,
    derivation: DerivationDag,
}

impl SchemaDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    /// Tables of one layer, in insertion order
    pub fn tables_in(&self, layer: Layer) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(move |t| t.layer == layer)
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn derivation(&self) -> &DerivationDag {
        &self.derivation
    }

    pub fn derivation_mut(&mut self) -> &mut DerivationDag {
        &mut self.derivation
    }

    /// Find a table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Find a field by its full coordinates
    pub fn resolve(&self, layer: Layer, table: &str, field: &str) -> Option<&Field> {
        self.table(table)
            .filter(|t| t.layer == layer)
            .and_then(|t| t.field(field))
    }

    /// Add a table; names are unique across layers
    pub fn add_table(&mut self, table: Table) -> Result<(), ValidationError> {
        if self.table(&table.name).is_some() {
            return Err(ValidationError::DuplicateTable(table.name));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Replace an existing table in place, returning the previous version
    pub fn replace_table(&mut self, table: Table) -> Result<Table, ValidationError> {
        let slot = self
            .tables
            .iter_mut()
            .find(|t| t.name == table.name)
            .ok_or_else(|| ValidationError::UnknownTable(table.name.clone()))?;
        Ok(std::mem::replace(slot, table))
    }

    /// Remove a table together with the relationships it owns
    ///
    /// Relationships pointing *at* the table are left in place; they show up
    /// in referential integrity validation.
    pub fn remove_table(&mut self, name: &str) -> Result<(Table, Vec<Relationship>), ValidationError> {
        let index = self
            .tables
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| ValidationError::UnknownTable(name.to_string()))?;
        let table = self.tables.remove(index);

        let (owned, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.relationships)
            .into_iter()
            .partition(|r| r.from_table == name);
        self.relationships = kept;
        self.derivation.remove(name);

        Ok((table, owned))
    }

    /// Add a relationship whose target must already resolve
    pub fn add_relationship(&mut self, relationship: Relationship) -> Result<(), ReferentialError> {
        let target_table = self
            .table(&relationship.to_table)
            .filter(|t| t.layer == relationship.to_layer);

        match target_table {
            None => Err(ReferentialError::MissingTargetTable {
                from: relationship.describe(),
                layer: relationship.to_layer,
                table: relationship.to_table.clone(),
            }),
            Some(t) if t.field(&relationship.to_field).is_none() => {
                Err(ReferentialError::MissingTargetField {
                    from: relationship.describe(),
                    layer: relationship.to_layer,
                    table: relationship.to_table.clone(),
                    field: relationship.to_field.clone(),
                })
            }
            Some(_) => {
                if !self.relationships.contains(&relationship) {
                    self.relationships.push(relationship);
                }
                Ok(())
            }
        }
    }

    /// Remove a relationship; returns whether it was present
    pub fn remove_relationship(&mut self, relationship: &Relationship) -> bool {
        let before = self.relationships.len();
        self.relationships.retain(|r| r != relationship);
        before != self.relationships.len()
    }

    /// Push a relationship without validating its target
    ///
    /// Used when loading stored documents, which may already contain
    /// dangling references that validation must be able to report.
    pub fn push_relationship_unchecked(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }
}

impl TryFrom<DictionaryDocument> for SchemaDictionary {
    type Error = ValidationError;

    fn try_from(doc: DictionaryDocument) -> Result<Self, Self::Error> {
        let mut dictionary = SchemaDictionary::new();

        for (layer, records) in [(Layer::L1, doc.l1), (Layer::L2, doc.l2), (Layer::L3, doc.l3)] {
            for mut record in records {
                record.layer = Some(layer);
                dictionary.add_table(Table::try_from(record)?)?;
            }
        }

        dictionary.relationships = doc.relationships;
        dictionary.derivation = doc.derivation_dag;
        Ok(dictionary)
    }
}

impl From<SchemaDictionary> for DictionaryDocument {
    fn from(dictionary: SchemaDictionary) -> Self {
        let mut doc = DictionaryDocument {
            relationships: dictionary.relationships,
            derivation_dag: dictionary.derivation,
            ..Default::default()
        };

        for table in dictionary.tables {
            let layer = table.layer;
            let mut record = TableRecord::from(table);
            record.layer = None;
            match layer {
                Layer::L1 => doc.l1.push(record),
                Layer::L2 => doc.l2.push(record),
                Layer::L3 => doc.l3.push(record),
            }
        }

        doc
    }
}
