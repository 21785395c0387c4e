//! Textract block-graph types and the signal walk.
//!
//! The service returns a flat list of blocks referencing each other by id
//! (a DAG: pages reference lines, keys reference values, cells reference
//! words). The walk builds an id index once and resolves relationships with
//! plain lookups.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::models::{ExtractionSignal, KeyValue};

/// Rows kept per table. Tables are concatenated in detection order.
pub const MAX_TABLE_ROWS: usize = 10;

/// Raw `AnalyzeDocument` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockGraph {
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    #[serde(default)]
    pub block_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entity_types: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub query: Option<Query>,
    #[serde(default)]
    pub row_index: Option<u32>,
    #[serde(default)]
    pub column_index: Option<u32>,
    #[serde(default)]
    pub selection_status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relationship {
    #[serde(rename = "Type", default)]
    pub rel_type: String,
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Query {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

impl Block {
    fn related_ids<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.rel_type == rel_type)
            .flat_map(|r| r.ids.iter().map(String::as_str))
    }
}

/// Walk the block graph into queries, key/value pairs, and table rows.
pub fn extract_signal(graph: &BlockGraph) -> ExtractionSignal {
    let index: HashMap<&str, &Block> = graph
        .blocks
        .iter()
        .map(|b| (b.id.as_str(), b))
        .collect();

    let mut signal = ExtractionSignal::default();

    for block in &graph.blocks {
        match block.block_type.as_str() {
            "QUERY" => {
                let Some(alias) = block.query.as_ref().and_then(|q| q.alias.as_deref()) else {
                    continue;
                };
                let answer = block
                    .related_ids("ANSWER")
                    .filter_map(|id| index.get(id))
                    .filter(|b| b.block_type == "QUERY_RESULT")
                    .filter_map(|b| b.text.as_deref())
                    .find(|t| !t.trim().is_empty());
                if let Some(text) = answer {
                    signal.queries.insert(alias.to_string(), text.trim().to_string());
                }
            }
            "KEY_VALUE_SET" if block.entity_types.iter().any(|t| t == "KEY") => {
                let key = child_text(block, &index);
                let value = block
                    .related_ids("VALUE")
                    .filter_map(|id| index.get(id))
                    .map(|value_block| child_text(value_block, &index))
                    .find(|t| !t.is_empty())
                    .unwrap_or_default();
                if !key.is_empty() {
                    signal.kvs.push(KeyValue::new(key, value));
                }
            }
            "TABLE" => {
                let mut rows: BTreeMap<u32, BTreeMap<u32, String>> = BTreeMap::new();
                for cell in block
                    .related_ids("CHILD")
                    .filter_map(|id| index.get(id))
                    .filter(|b| b.block_type == "CELL")
                {
                    let row = cell.row_index.unwrap_or(0);
                    let col = cell.column_index.unwrap_or(0);
                    rows.entry(row)
                        .or_default()
                        .insert(col, child_text(cell, &index));
                }
                for (_, cols) in rows.into_iter().take(MAX_TABLE_ROWS) {
                    signal
                        .table_rows
                        .push(cols.into_values().collect::<Vec<String>>());
                }
            }
            _ => {}
        }
    }

    signal
}

/// Concatenate every recognized word in the document into one text blob.
pub fn full_text(graph: &BlockGraph) -> String {
    graph
        .blocks
        .iter()
        .filter(|b| b.block_type == "WORD")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join the text of a block's WORD children (and selection marks) in order.
fn child_text(block: &Block, index: &HashMap<&str, &Block>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for id in block.related_ids("CHILD") {
        let Some(child) = index.get(id) else { continue };
        match child.block_type.as_str() {
            "WORD" => {
                if let Some(text) = child.text.as_deref() {
                    parts.push(text);
                }
            }
            "SELECTION_ELEMENT" => {
                if child.selection_status.as_deref() == Some("SELECTED") {
                    parts.push("[X]");
                }
            }
            _ => {}
        }
    }
    parts.join(" ").trim().to_string()
}
