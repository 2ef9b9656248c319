//! Reconciliation of durable records against an in-memory snapshot.

use crate::error::Result;
use crate::identity::Identity;
use crate::records::Record;
use crate::session::RecordStore;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// An in-memory item that is persisted as exactly one record of one kind.
pub trait Storeable: Sized + Send + Sync {
    type Id: Identity;
    type Record: Record;

    fn identifier(&self) -> Self::Id;

    /// Copy every state field onto the record. Must not touch the row id,
    /// the storeable identifier or `modified_at`.
    fn populate(&self, record: &mut Self::Record);

    /// Rebuild an item from a record whose identifier decoded to `id`.
    /// `None` when the record's fields are not a valid item.
    fn hydrate(id: Self::Id, record: &Self::Record) -> Option<Self>;
}

/// What a reconciliation did to one record kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub deleted: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Bring the records of `S::Record`'s kind in line with `snapshot`, as one
/// batch.
///
/// Afterwards there is exactly one record per item in the snapshot and no
/// other record of that kind. Records whose identifier does not decode are
/// deleted; duplicates keep the most recently modified one (the first by row
/// id on a tie). When several snapshot items share an identity, the last one
/// wins.
///
/// The batch is committed once. On any failure it is rolled back and the
/// error returned.
#[tracing::instrument(level = "debug", skip_all, fields(kind = <S::Record as Record>::KIND, snapshot = snapshot.len()))]
pub async fn reconcile<St, S>(store: &mut St, snapshot: &[S]) -> Result<Reconciliation>
where
    St: RecordStore,
    S: Storeable,
{
    let outcome = match apply(store, snapshot).await {
        Ok(summary) => store.commit().await.map(|()| summary),
        Err(err) => Err(err),
    };
    match outcome {
        Ok(summary) => {
            info!(
                deleted = summary.deleted,
                created = summary.created,
                updated = summary.updated,
                unchanged = summary.unchanged,
                "Reconciled records"
            );
            Ok(summary)
        },
        Err(err) => {
            if let Err(rollback) = store.rollback().await {
                debug!(error = ?rollback, "Rollback after failed reconciliation");
            }
            Err(err)
        },
    }
}

async fn apply<St, S>(store: &mut St, snapshot: &[S]) -> Result<Reconciliation>
where
    St: RecordStore,
    S: Storeable,
{
    let mut summary = Reconciliation::default();
    let (survivors, doomed) = deduplicate::<S::Id, S::Record>(store.fetch_all::<S::Record>().await?);
    for record in &doomed {
        store.delete(record).await?;
        summary.deleted += 1;
    }

    // Collapse the snapshot by identity, keeping first-seen order.
    let mut wanted: Vec<(S::Id, &S)> = Vec::with_capacity(snapshot.len());
    let mut positions: HashMap<S::Id, usize> = HashMap::with_capacity(snapshot.len());
    for item in snapshot {
        let id = item.identifier();
        match positions.get(&id) {
            Some(&position) => wanted[position].1 = item,
            None => {
                positions.insert(id.clone(), wanted.len());
                wanted.push((id, item));
            },
        }
    }

    let mut existing: HashMap<S::Id, S::Record> = HashMap::with_capacity(survivors.len());
    for (id, record) in survivors {
        if positions.contains_key(&id) {
            existing.insert(id, record);
        } else {
            store.delete(&record).await?;
            summary.deleted += 1;
        }
    }

    for (id, item) in wanted {
        match existing.remove(&id) {
            Some(mut record) => {
                let before = record.clone();
                item.populate(&mut record);
                if record == before {
                    summary.unchanged += 1;
                } else {
                    store.save(&mut record).await?;
                    summary.updated += 1;
                }
            },
            None => {
                let mut record = S::Record::default();
                record.set_storeable_identifier(id.encode());
                item.populate(&mut record);
                store.save(&mut record).await?;
                summary.created += 1;
            },
        }
    }
    Ok(summary)
}

/// Split records into one survivor per decoded identity (in row order) and
/// everything else.
pub(crate) fn deduplicate<I: Identity, R: Record>(records: Vec<R>) -> (Vec<(I, R)>, Vec<R>) {
    let mut survivors: Vec<(I, R)> = Vec::with_capacity(records.len());
    let mut positions: HashMap<I, usize> = HashMap::with_capacity(records.len());
    let mut doomed = Vec::new();
    for record in records {
        let Some(id) = record.storeable_identifier().and_then(I::decode) else {
            warn!(kind = R::KIND, row = ?record.id(), "Record has no valid identifier");
            doomed.push(record);
            continue;
        };
        match positions.get(&id) {
            None => {
                positions.insert(id.clone(), survivors.len());
                survivors.push((id, record));
            },
            Some(&position) => {
                warn!(kind = R::KIND, ?id, row = ?record.id(), "Duplicate record");
                let current = &mut survivors[position].1;
                if record.modified_at() > current.modified_at() {
                    doomed.push(std::mem::replace(current, record));
                } else {
                    doomed.push(record);
                }
            },
        }
    }
    (survivors, doomed)
}
