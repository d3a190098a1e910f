//! `SQLite` message store.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::memory::core::config::{StorageConfig, validate_identifier};
use crate::memory::core::errors::{AdapterErrorCode, MemoryError, MemoryResult};
use crate::memory::core::ids::{ResourceId, ThreadId};
use crate::memory::core::message::{Message, NewMessage, Role};
use crate::memory::core::thread::{Metadata, Thread};
use crate::memory::storage::message_store::{MessageStore, SelectBy};
use crate::memory::storage::{StoreFuture, classify_sqlite, other_error, unwrap_sqlite};

type ThreadRow = (ThreadId, ResourceId, Option<String>, String, i64, i64);

/// `SQLite` implementation of [`MessageStore`].
pub struct SqliteMessageStore {
    conn: Connection,
    threads_table: String,
    messages_table: String,
}

impl SqliteMessageStore {
    /// Open the database at `config.sqlite_path` and create tables.
    ///
    /// # Errors
    /// Returns an error if table names are invalid or the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> MemoryResult<Self> {
        validate_identifier("storage.threads_table", &config.threads_table)?;
        validate_identifier("storage.messages_table", &config.messages_table)?;

        let conn = Connection::open(&config.sqlite_path)
            .await
            .map_err(classify_sqlite)?;
        let threads_table = config.threads_table.clone();
        let messages_table = config.messages_table.clone();
        let (threads, messages) = (threads_table.clone(), messages_table.clone());

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {threads} (
                    id TEXT PRIMARY KEY,
                    resource_id TEXT NOT NULL,
                    title TEXT,
                    metadata TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{threads}_resource
                    ON {threads} (resource_id);
                CREATE TABLE IF NOT EXISTS {messages} (
                    thread_id TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    PRIMARY KEY (thread_id, seq)
                );"
            ))?;
            Ok(())
        })
        .await
        .map_err(classify_sqlite)?;

        Ok(Self {
            conn,
            threads_table,
            messages_table,
        })
    }
}

fn timestamp(millis: i64) -> MemoryResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        MemoryError::adapter(
            AdapterErrorCode::Corrupted,
            format!("invalid timestamp {millis}"),
        )
    })
}

fn decode_thread(row: ThreadRow) -> MemoryResult<Thread> {
    let (id, resource_id, title, metadata, created_at, updated_at) = row;
    let metadata: Metadata = serde_json::from_str(&metadata).map_err(|err| {
        MemoryError::adapter(
            AdapterErrorCode::Corrupted,
            format!("thread {id} metadata: {err}"),
        )
    })?;
    Ok(Thread {
        id,
        resource_id,
        title,
        metadata,
        created_at: timestamp(created_at)?,
        updated_at: timestamp(updated_at)?,
    })
}

fn decode_message(seq: i64, role: &str, content: String) -> MemoryResult<Message> {
    let sequence_index = u64::try_from(seq).map_err(|_| {
        MemoryError::adapter(AdapterErrorCode::Corrupted, format!("negative sequence {seq}"))
    })?;
    let role = Role::from_str(role).map_err(|err| {
        MemoryError::adapter(AdapterErrorCode::Corrupted, format!("invalid role: {err}"))
    })?;
    Ok(Message::new(role, content, sequence_index))
}

fn to_sql_int<T>(value: T) -> MemoryResult<i64>
where
    T: TryInto<i64> + Copy + std::fmt::Display,
{
    value.try_into().map_err(|_| {
        MemoryError::adapter(AdapterErrorCode::Storage, format!("{value} exceeds i64"))
    })
}

impl MessageStore for SqliteMessageStore {
    fn create_thread(&self, thread: Thread) -> StoreFuture<'_, MemoryResult<Thread>> {
        Box::pin(async move {
            let table = self.threads_table.clone();
            let metadata = serde_json::to_string(&thread.metadata)?;
            let row = thread.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table}
                            (id, resource_id, title, metadata, created_at, updated_at)
                            VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                        ),
                        rusqlite::params![
                            row.id,
                            row.resource_id,
                            row.title,
                            metadata,
                            row.created_at.timestamp_millis(),
                            row.updated_at.timestamp_millis()
                        ],
                    )?;
                    Ok(())
                })
                .await
                .map_err(classify_sqlite)?;
            Ok(thread)
        })
    }

    fn get_thread(&self, thread_id: ThreadId) -> StoreFuture<'_, MemoryResult<Option<Thread>>> {
        Box::pin(async move {
            let table = self.threads_table.clone();
            let row = self
                .conn
                .call(move |conn| {
                    let row: Option<ThreadRow> = conn
                        .query_row(
                            &format!(
                                "SELECT id, resource_id, title, metadata, created_at, updated_at
                                 FROM {table} WHERE id = ?1"
                            ),
                            rusqlite::params![thread_id],
                            |row| {
                                Ok((
                                    row.get(0)?,
                                    row.get(1)?,
                                    row.get(2)?,
                                    row.get(3)?,
                                    row.get(4)?,
                                    row.get(5)?,
                                ))
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await
                .map_err(classify_sqlite)?;

            row.map(decode_thread).transpose()
        })
    }

    fn append_messages(
        &self,
        thread_id: ThreadId,
        messages: Vec<NewMessage>,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        Box::pin(async move {
            let threads = self.threads_table.clone();
            let table = self.messages_table.clone();
            let now = Utc::now().timestamp_millis();

            let rows = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let touched = tx.execute(
                        &format!("UPDATE {threads} SET updated_at = ?2 WHERE id = ?1"),
                        rusqlite::params![thread_id, now],
                    )?;
                    if touched == 0 {
                        return Err(other_error(MemoryError::adapter(
                            AdapterErrorCode::ThreadNotFound,
                            format!("thread {thread_id} not found"),
                        )));
                    }

                    let next: i64 = tx.query_row(
                        &format!("SELECT COALESCE(MAX(seq) + 1, 0) FROM {table} WHERE thread_id = ?1"),
                        rusqlite::params![thread_id],
                        |row| row.get(0),
                    )?;

                    let mut rows = Vec::with_capacity(messages.len());
                    {
                        let mut stmt = tx.prepare(&format!(
                            "INSERT INTO {table} (thread_id, seq, role, content)
                             VALUES (?1, ?2, ?3, ?4)"
                        ))?;
                        for (seq, message) in (next..).zip(messages) {
                            stmt.execute(rusqlite::params![
                                thread_id,
                                seq,
                                message.role.as_str(),
                                message.content
                            ])?;
                            rows.push((seq, message.role, message.content));
                        }
                    }

                    tx.commit()?;
                    Ok(rows)
                })
                .await
                .map_err(unwrap_sqlite)?;

            rows.into_iter()
                .map(|(seq, role, content)| {
                    let sequence_index = u64::try_from(seq).map_err(|_| {
                        MemoryError::adapter(AdapterErrorCode::Storage, format!("sequence {seq}"))
                    })?;
                    Ok(Message::new(role, content, sequence_index))
                })
                .collect()
        })
    }

    fn query(
        &self,
        thread_id: ThreadId,
        select_by: SelectBy,
    ) -> StoreFuture<'_, MemoryResult<Vec<Message>>> {
        Box::pin(async move {
            let table = self.messages_table.clone();
            let last = select_by
                .last
                .map(to_sql_int)
                .transpose()?;
            let mut ranges = Vec::with_capacity(select_by.include.len());
            for range in &select_by.include {
                let anchor = to_sql_int(range.sequence_index)?;
                let before = to_sql_int(range.before)?;
                let after = to_sql_int(range.after)?;
                ranges.push((anchor, anchor.saturating_sub(before), anchor.saturating_add(after)));
            }
            let everything = select_by.is_all();

            let rows = self
                .conn
                .call(move |conn| {
                    let mut rows: BTreeMap<i64, (String, String)> = BTreeMap::new();
                    let mut collect = |stmt: &mut rusqlite::Statement<'_>,
                                       params: &[&dyn rusqlite::ToSql]|
                     -> rusqlite::Result<()> {
                        let mapped = stmt.query_map(params, |row| {
                            Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
                        })?;
                        for row in mapped {
                            let (seq, role, content) = row?;
                            rows.insert(seq, (role, content));
                        }
                        Ok(())
                    };

                    if everything {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT seq, role, content FROM {table} WHERE thread_id = ?1"
                        ))?;
                        collect(&mut stmt, rusqlite::params![thread_id])?;
                    }
                    if let Some(last) = last {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT seq, role, content FROM {table}
                             WHERE thread_id = ?1 ORDER BY seq DESC LIMIT ?2"
                        ))?;
                        collect(&mut stmt, rusqlite::params![thread_id, last])?;
                    }
                    if !ranges.is_empty() {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT seq, role, content FROM {table}
                             WHERE thread_id = ?1 AND seq BETWEEN ?2 AND ?3
                             AND EXISTS (SELECT 1 FROM {table} WHERE thread_id = ?1 AND seq = ?4)"
                        ))?;
                        for (anchor, start, end) in &ranges {
                            collect(&mut stmt, rusqlite::params![thread_id, start, end, anchor])?;
                        }
                    }
                    Ok(rows)
                })
                .await
                .map_err(classify_sqlite)?;

            rows.into_iter()
                .map(|(seq, (role, content))| decode_message(seq, &role, content))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::storage::message_store::IncludeRange;
    use serde_json::json;

    async fn store() -> SqliteMessageStore {
        let config = StorageConfig {
            sqlite_path: ":memory:".into(),
            ..StorageConfig::default()
        };
        SqliteMessageStore::new(&config).await.unwrap()
    }

    #[tokio::test]
    async fn threads_round_trip_with_metadata() {
        let store = store().await;
        let thread = Thread::new(ResourceId::new())
            .with_title("deploys")
            .with_metadata("team", json!("infra"));
        store.create_thread(thread.clone()).await.unwrap();

        let loaded = store.get_thread(thread.id).await.unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("deploys"));
        assert_eq!(loaded.metadata.get("team"), Some(&json!("infra")));
        assert_eq!(loaded.resource_id, thread.resource_id);
        assert!(store.get_thread(ThreadId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_continues_sequence_and_query_merges_windows() {
        let store = store().await;
        let thread = store
            .create_thread(Thread::new(ResourceId::new()))
            .await
            .unwrap();
        let batch: Vec<NewMessage> = (0..6).map(|i| NewMessage::user(format!("m{i}"))).collect();
        store.append_messages(thread.id, batch).await.unwrap();
        let more = store
            .append_messages(thread.id, vec![NewMessage::assistant("m6")])
            .await
            .unwrap();
        assert_eq!(more[0].sequence_index, 6);
        assert_eq!(more[0].role, Role::Assistant);

        let select = SelectBy {
            last: Some(1),
            include: vec![
                IncludeRange {
                    sequence_index: 1,
                    before: 2,
                    after: 1,
                },
                IncludeRange {
                    sequence_index: 40,
                    before: 1,
                    after: 1,
                },
            ],
        };
        let messages = store.query(thread.id, select).await.unwrap();
        let indexes: Vec<u64> = messages.iter().map(|m| m.sequence_index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 6]);
    }

    #[tokio::test]
    async fn append_to_unknown_thread_is_classified() {
        let store = store().await;
        let err = store
            .append_messages(ThreadId::new(), vec![NewMessage::user("x")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "THREAD_NOT_FOUND");
    }

    #[tokio::test]
    async fn duplicate_thread_is_a_storage_error() {
        let store = store().await;
        let thread = Thread::new(ResourceId::new());
        store.create_thread(thread.clone()).await.unwrap();
        let err = store.create_thread(thread).await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
    }

    #[tokio::test]
    async fn invalid_table_names_are_rejected_before_opening() {
        let config = StorageConfig {
            messages_table: "messages; DROP TABLE x".to_string(),
            ..StorageConfig::default()
        };
        let Err(err) = SqliteMessageStore::new(&config).await else {
            panic!("expected config error");
        };
        assert!(err.is_config_error());
    }
}
