use super::{Record, RecordQuery, sealed};

#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct WatchedRecord {
    pub id: Option<i64>,
    pub storeable_identifier: Option<Vec<u8>>,
    pub modified_at: i64,
    pub added_on: i64,
    pub suggestion_owner: Option<String>,
    pub suggestion_comment: Option<String>,
    pub rating: Option<i64>,
    pub watched_on: i64,
}

impl sealed::Sealed for WatchedRecord {}
impl Record for WatchedRecord {
    const KIND: &'static str = "watched";
    const SELECT_ALL: &'static str = include_str!("../../queries/watched/select_all.sql");
    const INSERT: &'static str = include_str!("../../queries/watched/insert.sql");
    const UPDATE: &'static str = include_str!("../../queries/watched/update.sql");
    const DELETE: &'static str = include_str!("../../queries/watched/delete.sql");

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn storeable_identifier(&self) -> Option<&[u8]> {
        self.storeable_identifier.as_deref()
    }

    fn set_storeable_identifier(&mut self, identifier: Vec<u8>) {
        self.storeable_identifier = Some(identifier);
    }

    fn modified_at(&self) -> i64 {
        self.modified_at
    }

    fn set_modified_at(&mut self, modified_at: i64) {
        self.modified_at = modified_at;
    }

    fn bind_fields<'q>(&self, query: RecordQuery<'q>) -> RecordQuery<'q> {
        query
            .bind(self.storeable_identifier.clone())
            .bind(self.modified_at)
            .bind(self.added_on)
            .bind(self.suggestion_owner.clone())
            .bind(self.suggestion_comment.clone())
            .bind(self.rating)
            .bind(self.watched_on)
    }
}
