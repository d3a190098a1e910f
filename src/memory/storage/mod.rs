//! Message store and vector index adapters.
//!
//! Both collaborators are traits with boxed-future methods so they can be
//! shared as `Arc<dyn ...>`. Each ships an in-memory and a `SQLite` backend.

use std::future::Future;
use std::pin::Pin;

use crate::memory::core::errors::{AdapterErrorCode, MemoryError};

pub mod filter;
pub mod memory_store;
pub mod message_store;
pub mod sqlite_message_store;
pub mod sqlite_vec_loader;
pub mod sqlite_vector_index;
pub mod vector_index;

pub use filter::{MAX_FILTER_KEY_LEN, MetadataFilter};
pub use memory_store::{InMemoryMessageStore, InMemoryVectorIndex};
pub use message_store::{IncludeRange, MessageStore, SelectBy};
pub use sqlite_message_store::SqliteMessageStore;
pub use sqlite_vec_loader::init_sqlite_vec_extension;
pub use sqlite_vector_index::SqliteVectorIndex;
pub use vector_index::{IndexedVector, VectorIndex, cosine_similarity};

/// Boxed future type for store and index operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Classify an async `SQLite` failure into a stable adapter error.
pub(crate) fn classify_sqlite(err: tokio_rusqlite::Error) -> MemoryError {
    match err {
        tokio_rusqlite::Error::ConnectionClosed => {
            MemoryError::adapter(AdapterErrorCode::StoreUnavailable, "connection closed")
        }
        tokio_rusqlite::Error::Rusqlite(inner) => classify_rusqlite(&inner),
        other => MemoryError::adapter(AdapterErrorCode::Storage, other.to_string()),
    }
}

/// Classify a synchronous `SQLite` failure into a stable adapter error.
pub(crate) fn classify_rusqlite(err: &rusqlite::Error) -> MemoryError {
    let code = match err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            rusqlite::ErrorCode::CannotOpen
            | rusqlite::ErrorCode::DatabaseBusy
            | rusqlite::ErrorCode::DatabaseLocked
            | rusqlite::ErrorCode::NotADatabase
            | rusqlite::ErrorCode::PermissionDenied => AdapterErrorCode::StoreUnavailable,
            rusqlite::ErrorCode::DatabaseCorrupt => AdapterErrorCode::Corrupted,
            _ => AdapterErrorCode::Storage,
        },
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => AdapterErrorCode::Corrupted,
        _ => AdapterErrorCode::Storage,
    };
    MemoryError::adapter(code, err.to_string())
}

/// Smuggle a domain error out of a `tokio_rusqlite` closure.
pub(crate) fn other_error(err: MemoryError) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(err))
}

/// Recover a domain error smuggled with [`other_error`], classifying the rest.
pub(crate) fn unwrap_sqlite(err: tokio_rusqlite::Error) -> MemoryError {
    match err {
        tokio_rusqlite::Error::Other(inner) => match inner.downcast::<MemoryError>() {
            Ok(memory_err) => *memory_err,
            Err(inner) => MemoryError::adapter(AdapterErrorCode::Storage, inner.to_string()),
        },
        other => classify_sqlite(other),
    }
}
