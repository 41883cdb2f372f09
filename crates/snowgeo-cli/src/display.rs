//! Display utilities for formatting CLI output.
//!
//! This module provides table row structures and formatting functions
//! for presenting supported tables and resolved schemas.

use tabled::{Table, Tabled};

use snowgeo_core::schema::ResolvedSchema;
use snowgeo_core::tables::TableDefinition;
use snowgeo_core::types::FieldDescriptor;

/// Table row representation for displaying a supported ticket table.
#[derive(Tabled)]
pub struct TableRow {
    /// Request id of the table.
    #[tabled(rename = "Id")]
    pub id: String,
    /// Additional request ids.
    #[tabled(rename = "Aliases")]
    pub aliases: String,
    /// Table queried upstream.
    #[tabled(rename = "Source Table")]
    pub source_table: String,
    /// Layer display name.
    #[tabled(rename = "Name")]
    pub name: String,
}

/// Table row representation for displaying a field descriptor.
#[derive(Tabled)]
pub struct FieldRow {
    /// Dotted source key.
    #[tabled(rename = "Field")]
    pub field: String,
    /// Human label.
    #[tabled(rename = "Alias")]
    pub alias: String,
    /// Remote internal type.
    #[tabled(rename = "Internal Type")]
    pub internal_type: String,
    /// Whether the type is mapped.
    #[tabled(rename = "Supported")]
    pub supported: String,
    /// Whether the field is requested upstream.
    #[tabled(rename = "Fetched")]
    pub fetched: String,
    /// Output property name.
    #[tabled(rename = "Output")]
    pub output: String,
    /// Output field type.
    #[tabled(rename = "Output Type")]
    pub output_type: String,
}

fn yes_no(flag: bool) -> String {
    String::from(if flag { "Yes" } else { "No" })
}

impl From<&TableDefinition> for TableRow {
    fn from(table: &TableDefinition) -> Self {
        Self {
            id: table.id.to_string(),
            aliases: if table.aliases.is_empty() {
                "-".to_string()
            } else {
                table.aliases.join(", ")
            },
            source_table: table.source_table.to_string(),
            name: table.display_name.to_string(),
        }
    }
}

impl From<&FieldDescriptor> for FieldRow {
    fn from(descriptor: &FieldDescriptor) -> Self {
        Self {
            field: descriptor.key(),
            alias: descriptor.alias.clone(),
            internal_type: descriptor.internal_type.clone(),
            supported: yes_no(descriptor.supported),
            fetched: yes_no(descriptor.supported && descriptor.fetch),
            output: descriptor
                .output
                .as_ref()
                .map_or_else(|| "-".to_string(), |o| o.name.clone()),
            output_type: descriptor
                .output
                .as_ref()
                .map_or_else(|| "-".to_string(), |o| o.output_type.to_string()),
        }
    }
}

/// Display the supported tables in a formatted table.
pub fn display_tables(tables: &[TableDefinition]) {
    println!("\nSupported Tables ({} total):\n", tables.len());

    let rows: Vec<TableRow> = tables.iter().map(TableRow::from).collect();
    let table = Table::new(rows).to_string();
    println!("{table}");
}

/// Display a resolved schema in a formatted table.
pub fn display_schema(schema: &ResolvedSchema) {
    println!(
        "\nTable: {} ({})",
        schema.table.display_name, schema.table.source_table
    );
    if let Some(id_field) = schema.identity.id_field() {
        println!("Identity field: {id_field}");
    }
    println!(
        "Fetched fields: {}, output fields: {}",
        schema.fetch_fields.len(),
        schema.output_fields.len()
    );

    if !schema.descriptors.is_empty() {
        println!("\n=== Fields ===");

        let rows: Vec<FieldRow> = schema.descriptors.iter().map(FieldRow::from).collect();
        let table = Table::new(rows).to_string();
        println!("{table}");
    }
}
