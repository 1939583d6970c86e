mod loader;
mod repository;
mod schema;

pub use loader::BatchLoader;
pub use repository::Repository;

/// Opens the schema on a plain connection; used by the parse passes' tests.
#[cfg(test)]
pub fn test_connection() -> rusqlite::Connection {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch(schema::PRAGMAS).unwrap();
    conn.execute_batch(schema::SCHEMA).unwrap();
    conn
}
