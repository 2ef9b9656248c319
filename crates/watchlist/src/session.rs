//! Batched access to durable records.

use crate::error::{ErrorKind, Result};
use crate::records::Record;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use sqlx::{Row, Sqlite, Transaction};
use time::UtcDateTime;

/// A batch of reads and writes against the record tables.
///
/// Changes become durable on [`commit`](Self::commit); after `commit` or
/// [`rollback`](Self::rollback) every operation fails with
/// [`SessionClosed`](ErrorKind::SessionClosed).
#[async_trait]
pub trait RecordStore: Send {
    /// Every record of one kind, ordered by row id.
    async fn fetch_all<R: Record>(&mut self) -> Result<Vec<R>>;

    /// Insert the record when it has no row id yet, update it otherwise.
    /// Stamps `modified_at` and, on insert, assigns the new row id.
    async fn save<R: Record>(&mut self, record: &mut R) -> Result<()>;

    /// Delete the record's row. Records that were never inserted are ignored.
    async fn delete<R: Record>(&mut self, record: &R) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// [`RecordStore`] over a SQLite transaction.
pub struct Session {
    transaction: Option<Transaction<'static, Sqlite>>,
}
impl Session {
    pub(crate) fn new(transaction: Transaction<'static, Sqlite>) -> Self {
        Self { transaction: Some(transaction) }
    }

    fn transaction(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        self.transaction.as_mut().ok_or_raise(|| ErrorKind::SessionClosed)
    }

    fn now() -> i64 {
        crate::records::to_millis(UtcDateTime::now())
    }
}

#[async_trait]
impl RecordStore for Session {
    async fn fetch_all<R: Record>(&mut self) -> Result<Vec<R>> {
        let transaction = self.transaction()?;
        sqlx::query_as::<_, R>(R::SELECT_ALL)
            .fetch_all(&mut **transaction)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    async fn save<R: Record>(&mut self, record: &mut R) -> Result<()> {
        // Never stamp a time earlier than what is already recorded, in case
        // the sync engine's clock runs ahead of ours.
        record.set_modified_at(Self::now().max(record.modified_at()));
        let transaction = self.transaction()?;
        match record.id() {
            None => {
                let row = record
                    .bind_fields(sqlx::query(R::INSERT))
                    .fetch_one(&mut **transaction)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                let id: i64 = row.try_get(0).or_raise(|| ErrorKind::Database)?;
                record.set_id(id);
            },
            Some(id) => {
                let result = record
                    .bind_fields(sqlx::query(R::UPDATE))
                    .bind(id)
                    .execute(&mut **transaction)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                if result.rows_affected() == 0 {
                    exn::bail!(ErrorKind::InvalidData("record id"));
                }
            },
        }
        Ok(())
    }

    async fn delete<R: Record>(&mut self, record: &R) -> Result<()> {
        let Some(id) = record.id() else {
            return Ok(());
        };
        let transaction = self.transaction()?;
        sqlx::query(R::DELETE)
            .bind(id)
            .execute(&mut **transaction)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let transaction = self.transaction.take().ok_or_raise(|| ErrorKind::SessionClosed)?;
        transaction.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn rollback(&mut self) -> Result<()> {
        let transaction = self.transaction.take().ok_or_raise(|| ErrorKind::SessionClosed)?;
        transaction.rollback().await.or_raise(|| ErrorKind::Database)
    }
}
