//! Process-wide registration of the sqlite-vec extension.
//!
//! The only unsafe code in the crate lives here.

use std::sync::Once;

use rusqlite::ffi::{sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;

type SqliteExtensionFn =
    unsafe extern "C" fn(*mut sqlite3, *mut *mut i8, *const sqlite3_api_routines) -> i32;

static REGISTER: Once = Once::new();

/// Register sqlite-vec as an auto-loaded extension for every new connection.
///
/// Safe to call repeatedly; registration happens once per process. Must run
/// before opening a connection that creates or queries `vec0` tables.
#[allow(unsafe_code)]
pub fn init_sqlite_vec_extension() {
    REGISTER.call_once(|| {
        // SAFETY: sqlite3_vec_init has the extension entry point signature
        // and sqlite3_auto_extension only stores the pointer.
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteExtensionFn>(
                sqlite3_vec_init as *const (),
            )));
        }
    });
}
