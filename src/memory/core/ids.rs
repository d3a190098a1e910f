//! Thread and owner identifiers.
//!
//! Both are UUID newtypes so a thread id can never be passed where an owner
//! id is expected. They are stored as TEXT in `SQLite`.
//!
//! With the `uuid_v7` feature, new thread ids are time ordered, which keeps
//! inserts into the threads table roughly append-only.

use core::fmt;
use core::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "uuid_v7")]
fn thread_uuid() -> Uuid {
    Uuid::now_v7()
}

#[cfg(not(feature = "uuid_v7"))]
fn thread_uuid() -> Uuid {
    Uuid::new_v4()
}

fn parse_sql_uuid(value: ValueRef<'_>) -> FromSqlResult<Uuid> {
    match value {
        ValueRef::Text(raw) => std::str::from_utf8(raw)
            .map_err(|err| FromSqlError::Other(Box::new(err)))
            .and_then(|text| {
                Uuid::parse_str(text).map_err(|err| FromSqlError::Other(Box::new(err)))
            }),
        ValueRef::Blob(raw) => Uuid::from_slice(raw).map_err(|_| FromSqlError::InvalidBlobSize {
            expected_size: 16,
            blob_size: raw.len(),
        }),
        _ => Err(FromSqlError::InvalidType),
    }
}

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident => $generate:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh identifier.
            #[must_use]
            pub fn new() -> Self {
                Self($generate)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0.to_string()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                parse_sql_uuid(value).map(Self)
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of a conversation thread.
    ThreadId => thread_uuid()
);

uuid_newtype!(
    /// Identifier of the resource (user, workspace) that owns threads.
    ResourceId => Uuid::new_v4()
);
