//! Bulk translator: projected documents to index/delete operations.

use serde_json::Value;

use super::bulk::BulkOperation;
use super::document::{ProjectedDocument, LOCATION_FIELD};
use crate::errors::Result;

/// Index body for a live document: serialized fields plus the geo-point
/// when both coordinates are known.
///
/// Without a geo-point the field is written as `null`, so a merging upsert
/// clears the location an earlier sync stored.
pub fn document_body(document: &ProjectedDocument) -> Result<Value> {
    let mut body = serde_json::to_value(document)?;
    let location = match document.location() {
        Some(point) => serde_json::to_value(point)?,
        None => Value::Null,
    };
    if let Some(fields) = body.as_object_mut() {
        fields.insert(LOCATION_FIELD.to_string(), location);
    }
    Ok(body)
}

/// Translate a page. Soft-deleted documents become deletes; everything else
/// becomes an upsert. Input order is kept.
pub fn translate(documents: &[ProjectedDocument], retry_on_conflict: u32) -> Result<Vec<BulkOperation>> {
    documents
        .iter()
        .map(|document| {
            if document.deleted {
                Ok(BulkOperation::delete(document.document_id()))
            } else {
                Ok(BulkOperation::upsert(
                    document.document_id(),
                    document_body(document)?,
                    retry_on_conflict,
                ))
            }
        })
        .collect()
}

/// Partial upsert touching a single numeric field.
pub fn counter_operation(user_id: i64, field: &str, value: i64, retry_on_conflict: u32) -> BulkOperation {
    let mut document = serde_json::Map::new();
    document.insert(field.to_string(), Value::from(value));
    BulkOperation::upsert(user_id.to_string(), Value::Object(document), retry_on_conflict)
}
