//! Statistical schema inference over a document sample

use crate::convert::bson_type_name;
use bson::{Bson, Document};
use datalink_core::{ColumnMetadata, FieldSampleStats};
use std::collections::BTreeMap;

pub const ID_FIELD: &str = "_id";

/// Infer top-level fields from sampled documents.
///
/// Each field takes its most frequent non-null type, ties resolved by the lexically smallest
/// type name. `_id` always comes first, is never nullable and is the primary key.
pub fn infer_fields(documents: &[Document]) -> Vec<ColumnMetadata> {
    let drawn = documents.len() as u64;
    let mut order: Vec<String> = vec![ID_FIELD.to_string()];
    let mut stats: BTreeMap<String, FieldSampleStats> = BTreeMap::new();

    for doc in documents {
        for (key, value) in doc {
            let entry = stats.entry(key.clone()).or_insert_with(|| {
                if key != ID_FIELD {
                    order.push(key.clone());
                }
                FieldSampleStats {
                    present_count: 0,
                    null_count: 0,
                    sample_size: drawn,
                    type_counts: BTreeMap::new(),
                }
            });
            entry.present_count += 1;
            if matches!(value, Bson::Null) {
                entry.null_count += 1;
            } else {
                *entry
                    .type_counts
                    .entry(bson_type_name(value).to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    order
        .into_iter()
        .map(|name| {
            let Some(sampled) = stats.remove(&name) else {
                // only `_id` can be missing from every document
                let mut id = ColumnMetadata::new(name, "ObjectId", false);
                id.auto_increment = true;
                return id;
            };

            let is_id = name == ID_FIELD;
            let data_type = dominant_type(&sampled.type_counts);
            let nullable = !is_id
                && (sampled.null_count > 0 || sampled.present_count < sampled.sample_size);

            let mut column = ColumnMetadata::new(name, data_type, nullable);
            column.auto_increment = is_id;
            column.sampled = Some(sampled);
            column
        })
        .collect()
}

/// Most frequent type; BTreeMap iteration is lexical so the first maximum wins ties
fn dominant_type(type_counts: &BTreeMap<String, u64>) -> String {
    let mut best: Option<(&String, u64)> = None;
    for (name, count) in type_counts {
        if best.map_or(true, |(_, top)| *count > top) {
            best = Some((name, *count));
        }
    }
    best.map(|(name, _)| name.clone())
        .unwrap_or_else(|| "null".to_string())
}

/// Fields observed with more than one non-null type, with their type tallies
pub fn inconsistent_fields(columns: &[ColumnMetadata]) -> Vec<(&str, &BTreeMap<String, u64>)> {
    columns
        .iter()
        .filter_map(|c| {
            let sampled = c.sampled.as_ref()?;
            (sampled.type_counts.len() > 1).then_some((c.name.as_str(), &sampled.type_counts))
        })
        .collect()
}
