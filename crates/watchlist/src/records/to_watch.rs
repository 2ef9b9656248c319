use super::{Record, RecordQuery, sealed};

#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct ToWatchRecord {
    pub id: Option<i64>,
    pub storeable_identifier: Option<Vec<u8>>,
    pub modified_at: i64,
    pub added_on: i64,
    pub suggestion_owner: Option<String>,
    pub suggestion_comment: Option<String>,
}

impl sealed::Sealed for ToWatchRecord {}
impl Record for ToWatchRecord {
    const KIND: &'static str = "to_watch";
    const SELECT_ALL: &'static str = include_str!("../../queries/to_watch/select_all.sql");
    const INSERT: &'static str = include_str!("../../queries/to_watch/insert.sql");
    const UPDATE: &'static str = include_str!("../../queries/to_watch/update.sql");
    const DELETE: &'static str = include_str!("../../queries/to_watch/delete.sql");

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
    }
}
