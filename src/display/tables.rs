//! Table formatting utilities for structured output.

use crate::index::IndexManifest;
use crate::io::format::format_unix_timestamp;
use crate::rank::RankedResult;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        // Apply rounded corners
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Create the ranked results table of a search.
pub fn create_results_table(results: &[RankedResult]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Video").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("Hits").add_attribute(Attribute::Bold),
        Cell::new("URL").add_attribute(Attribute::Bold),
    ]);

    for (rank, result) in results.iter().enumerate() {
        let url = if result.url.is_empty() {
            Cell::new("<no url>").fg(Color::DarkGrey)
        } else {
            Cell::new(&result.url)
        };
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(result.entity_id.as_str()),
            Cell::new(format!("{:.4}", result.score)).set_alignment(CellAlignment::Right),
            Cell::new(result.hits).set_alignment(CellAlignment::Right),
            url,
        ]);
    }

    table.to_string()
}

/// Create a summary table describing a built index.
pub fn create_index_table(manifest: &IndexManifest) -> String {
    // Plain rows without ANSI colors (comfy-table doesn't handle them well)
    let mut builder = TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["Index kind".to_string(), manifest.index_kind.to_string()])
        .add_row(vec!["Encoder model".to_string(), manifest.model_name.clone()])
        .add_row(vec!["Dimension".to_string(), manifest.dimension.to_string()])
        .add_row(vec!["Vectors".to_string(), manifest.vector_count.to_string()])
        .add_row(vec![
            "Videos".to_string(),
            manifest.entries.entity_count().to_string(),
        ]);

    for (kind, count) in manifest.entries.kind_counts() {
        builder = builder.add_row(vec![format!("  {kind} vectors"), count.to_string()]);
    }

    builder
        .add_row(vec![
            "Built".to_string(),
            format_unix_timestamp(manifest.created_at),
        ])
        .build()
}
