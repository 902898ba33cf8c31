//! §4.6 — the CDC apply path, symmetric to capture. Generic over any
//! `DataOperator` so both native and polling-diff events replay through
//! the same code.

use anchor_connector::{CallContext, DataOperator};
use anchor_types::{AnchorError, AnchorResult, BackendId, CdcEvent, CdcOperation, PortableValue, Row};

/// How `Insert` events are applied: a strict insert, or an upsert keyed on
/// the given unique columns (§4.6: "backend's upsert-style or strict
/// insert per config").
#[derive(Debug, Clone)]
pub enum InsertMode {
    Strict,
    Upsert(Vec<String>),
}

/// Builds the WHERE predicate from a row, skipping any column whose value
/// is null (§4.5.2 "Tombstone policy": the backend cannot express `=
/// NULL`, and a primary key is never legitimately null, so a null-valued
/// column is never a usable predicate term). Returns `InvalidData` if
/// every candidate column is null, matching scenario 5 in §8: never
/// silently falling through to an empty, table-wide predicate.
fn non_null_predicate(backend: BackendId, operation: &str, row: &Row) -> AnchorResult<Row> {
    let predicate: Row = row
        .iter()
        .filter(|(_, value)| !matches!(value, PortableValue::Null))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if predicate.is_empty() {
        return Err(AnchorError::invalid_data(
            backend,
            operation,
            "no WHERE conditions for DELETE",
        ));
    }
    Ok(predicate)
}

/// Applies one CDC event against `data` for `table`. `insert_mode`
/// controls whether `Insert` becomes a strict insert or an upsert.
pub async fn apply_cdc_event(
    ctx: &CallContext,
    backend: BackendId,
    data: &dyn DataOperator,
    table: &str,
    event: &CdcEvent,
    insert_mode: Option<&InsertMode>,
) -> AnchorResult<()> {
    match event.operation {
        CdcOperation::Insert => {
            let row = event
                .data
                .clone()
                .ok_or_else(|| AnchorError::invalid_data(backend, "apply_cdc_insert", "Insert event has no data"))?;
            match insert_mode {
                Some(InsertMode::Upsert(unique_columns)) => {
                    data.upsert(ctx, table, vec![row], unique_columns).await?;
                }
                _ => {
                    data.insert(ctx, table, vec![row]).await?;
                }
            }
        }
        CdcOperation::Update => {
            let new_row = event
                .data
                .clone()
                .ok_or_else(|| AnchorError::invalid_data(backend, "apply_cdc_update", "Update event has no data"))?;
            // WHERE from old_data if present, else from data (§4.6).
            let predicate_source = event.old_data.clone().unwrap_or_else(|| new_row.clone());
            let predicate = non_null_predicate(backend, "apply_cdc_update", &predicate_source)?;
            let where_columns: Vec<String> = predicate.keys().cloned().collect();

            // The row passed to `update` carries the new SET values, with
            // its WHERE-column entries overwritten by the pre-image
            // values so the adapter matches the row that actually exists.
            let mut merged = new_row;
            for (column, value) in &predicate {
                merged.insert(column.clone(), value.clone());
            }
            data.update(ctx, table, vec![merged], &where_columns).await?;
        }
        CdcOperation::Delete => {
            // WHERE from old_data ?? data (§4.6).
            let predicate_source = event
                .old_data
                .clone()
                .or_else(|| event.data.clone())
                .ok_or_else(|| AnchorError::invalid_data(backend, "apply_cdc_delete", "Delete event has no old_data or data"))?;
            let predicate = non_null_predicate(backend, "apply_cdc_delete", &predicate_source)?;
            data.delete(ctx, table, &predicate).await?;
        }
        CdcOperation::Truncate => {
            data.wipe(ctx, table).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDataOperator;
    use anchor_connector::CallTarget;
    use chrono::Utc;

    fn row(id: i64, v: &str) -> Row {
        let mut r = Row::new();
        r.insert("id".into(), PortableValue::Int(id));
        r.insert("v".into(), PortableValue::String(v.to_string()));
        r
    }

    #[tokio::test]
    async fn delete_with_null_primary_key_is_rejected_and_table_is_untouched() {
        let target = FakeDataOperator::new();
        let ctx = CallContext::for_test(CallTarget::Database("t".into()));
        target.insert(&ctx, "t", vec![row(1, "x")]).await.unwrap();

        let mut old = Row::new();
        old.insert("id".into(), PortableValue::Null);
        old.insert("v".into(), PortableValue::String("x".into()));
        let event = CdcEvent::delete("public", "t", old, Utc::now());

        let err = apply_cdc_event(&ctx, BackendId::Postgres, &target, "t", &event, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AnchorError::InvalidData { .. }));
        assert_eq!(target.fetch(&ctx, "t", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insert_then_update_then_delete_round_trips() {
        let target = FakeDataOperator::new();
        let ctx = CallContext::for_test(CallTarget::Database("t".into()));

        let insert_event = CdcEvent::insert("public", "t", row(1, "a"), Utc::now());
        apply_cdc_event(&ctx, BackendId::Postgres, &target, "t", &insert_event, None).await.unwrap();
        assert_eq!(target.fetch(&ctx, "t", None).await.unwrap().len(), 1);

        let update_event = CdcEvent::update("public", "t", row(1, "a"), row(1, "b"), Utc::now());
        apply_cdc_event(&ctx, BackendId::Postgres, &target, "t", &update_event, None).await.unwrap();
        let rows = target.fetch(&ctx, "t", None).await.unwrap();
        assert_eq!(rows[0].get("v"), Some(&PortableValue::String("b".into())));

        let delete_event = CdcEvent::delete("public", "t", row(1, "b"), Utc::now());
        apply_cdc_event(&ctx, BackendId::Postgres, &target, "t", &delete_event, None).await.unwrap();
        assert_eq!(target.fetch(&ctx, "t", None).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn truncate_wipes_the_table() {
        let target = FakeDataOperator::new();
        let ctx = CallContext::for_test(CallTarget::Database("t".into()));
        target.insert(&ctx, "t", vec![row(1, "a"), row(2, "b")]).await.unwrap();

        let event = CdcEvent {
            timestamp: Utc::now(),
            schema_name: "public".into(),
            table_name: "t".into(),
            operation: CdcOperation::Truncate,
            data: None,
            old_data: None,
            lsn: String::new(),
            metadata: Default::default(),
        };
        apply_cdc_event(&ctx, BackendId::Postgres, &target, "t", &event, None).await.unwrap();
        assert_eq!(target.fetch(&ctx, "t", None).await.unwrap().len(), 0);
    }
}
