//! Database schema migrations.
//!
//! Applies the initial schema: chat_sessions and chat_messages for the
//! conversation store, plus the retail tables (customers, products, orders,
//! order_items) that lookups query. Retail `created_at` columns are TEXT
//! ISO-8601 so normalized date strings compare chronologically.

use rusqlite::Connection;
use tracing::info;

use tally_core::error::TallyError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), TallyError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| TallyError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| TallyError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), TallyError> {
    conn.execute_batch(
        "
        -- Chat sessions. Never deleted by the core; title is fixed at creation.
        CREATE TABLE IF NOT EXISTS chat_sessions (
            id          TEXT PRIMARY KEY NOT NULL,
            user        TEXT,
            title       TEXT NOT NULL DEFAULT 'New Session',
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        -- Chat messages: append-only, owned exclusively by one session.
        CREATE TABLE IF NOT EXISTS chat_messages (
            id          TEXT PRIMARY KEY NOT NULL,
            session_id  TEXT NOT NULL,
            role        TEXT NOT NULL
                        CHECK (role IN ('user', 'assistant')),
            content     TEXT,
            created_at  INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_session
            ON chat_messages (session_id, created_at DESC);

        -- Retail tables: lookup targets only. CRUD for these lives elsewhere.
        CREATE TABLE IF NOT EXISTS customers (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            email       TEXT,
            phone       TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS products (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            price           REAL NOT NULL DEFAULT 0,
            category        TEXT,
            description     TEXT,
            stock_quantity  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS orders (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id   INTEGER NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending',
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            requested_by  TEXT,
            FOREIGN KEY (customer_id) REFERENCES customers(id)
        );

        CREATE INDEX IF NOT EXISTS idx_orders_status
            ON orders (status);

        CREATE INDEX IF NOT EXISTS idx_orders_created_at
            ON orders (created_at DESC);

        CREATE TABLE IF NOT EXISTS order_items (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id    INTEGER NOT NULL,
            product_id  INTEGER NOT NULL,
            quantity    INTEGER NOT NULL DEFAULT 1,
            price       REAL NOT NULL DEFAULT 0,
            FOREIGN KEY (order_id) REFERENCES orders(id) ON DELETE CASCADE,
            FOREIGN KEY (product_id) REFERENCES products(id)
        );

        CREATE INDEX IF NOT EXISTS idx_order_items_order
            ON order_items (order_id);

        -- Record migration.
        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| TallyError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        // Running again should be idempotent.
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_chat_tables_exist() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO chat_sessions (id, title, created_at, updated_at)
             VALUES ('sess-1', 'New Session', 1700000000, 1700000000)",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO chat_messages (id, session_id, role, content, created_at)
             VALUES ('msg-1', 'sess-1', 'user', 'hello', 1700000000)",
            [],
        )
        .unwrap();

        let content: String = conn
            .query_row(
                "SELECT content FROM chat_messages WHERE id = 'msg-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_message_role_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO chat_sessions (id, title, created_at, updated_at)
             VALUES ('sess-1', 'New Session', 0, 0)",
            [],
        )
        .unwrap();

        // The transient function role is never persisted.
        let result = conn.execute(
            "INSERT INTO chat_messages (id, session_id, role, content, created_at)
             VALUES ('msg-1', 'sess-1', 'function', '{}', 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_message_requires_existing_session() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO chat_messages (id, session_id, role, content, created_at)
             VALUES ('msg-1', 'no-such-session', 'user', 'hi', 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_deleting_session_cascades_to_messages() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO chat_sessions (id, title, created_at, updated_at)
             VALUES ('sess-1', 'New Session', 0, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO chat_messages (id, session_id, role, content, created_at)
             VALUES ('msg-1', 'sess-1', 'user', 'hi', 0)",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM chat_sessions WHERE id = 'sess-1'", [])
            .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_retail_tables_exist() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO customers (name, email) VALUES ('John Doe', 'john@example.com')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO products (name, price, category, stock_quantity)
             VALUES ('Widget', 9.99, 'hardware', 12)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO orders (customer_id, status, created_at, requested_by)
             VALUES (1, 'pending', '2025-02-06 10:00:00', 'john')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO order_items (order_id, product_id, quantity, price)
             VALUES (1, 1, 2, 19.98)",
            [],
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM order_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
