use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Result};

use crate::error::{AppError, AppResult};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %err, dir = %parent.display(), "could not create database directory");
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Exclusive access to the connection for the duration of one operation.
    pub fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database lock poisoned".to_string()))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        conn.execute_batch(
            "
            -- Staff accounts
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'Cashier'
                    CHECK (role IN ('Admin', 'Waiter', 'Cook', 'Cashier')),
                active INTEGER NOT NULL DEFAULT 1
            );

            -- Refresh-token allow-list, at most one row per user
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                user_id INTEGER PRIMARY KEY,
                jti TEXT NOT NULL UNIQUE,
                expires_at DATETIME NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            -- Orders
            CREATE TABLE IF NOT EXISTS restaurant_orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number INTEGER NOT NULL,
                entry_time DATETIME NOT NULL,
                exit_time DATETIME,
                status TEXT NOT NULL DEFAULT 'Open'
                    CHECK (status IN ('Open', 'Closed', 'Cancelled')),
                note TEXT NOT NULL DEFAULT '',
                payment_method TEXT
                    CHECK (payment_method IN ('Cash', 'Card', 'Pix', 'Others')),
                total_amount REAL NOT NULL DEFAULT 0,
                paid INTEGER NOT NULL DEFAULT 0
            );

            -- A table number can only have one open order at a time
            CREATE UNIQUE INDEX IF NOT EXISTS idx_open_order_number
                ON restaurant_orders(number) WHERE status = 'Open';

            CREATE TABLE IF NOT EXISTS order_status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                restaurant_order_id INTEGER NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('Open', 'Closed', 'Cancelled')),
                change_time DATETIME NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (restaurant_order_id) REFERENCES restaurant_orders(id)
            );

            -- Fixed-price catalog
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                price REAL NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                stock INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1
            );

            -- Weighed catalog entries
            CREATE TABLE IF NOT EXISTS products_per_kg (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                description TEXT NOT NULL DEFAULT '',
                weight REAL NOT NULL,
                price_per_kg REAL NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                total REAL GENERATED ALWAYS AS (weight * price_per_kg) STORED
            );

            CREATE TABLE IF NOT EXISTS kg_prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                price REAL NOT NULL,
                category TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                restaurant_order_id INTEGER NOT NULL,
                product_id INTEGER,
                product_per_kg_id INTEGER,
                quantity INTEGER NOT NULL DEFAULT 1,
                FOREIGN KEY (restaurant_order_id) REFERENCES restaurant_orders(id),
                FOREIGN KEY (product_id) REFERENCES products(id),
                FOREIGN KEY (product_per_kg_id) REFERENCES products_per_kg(id),
                CHECK ((product_id IS NOT NULL AND product_per_kg_id IS NULL)
                    OR (product_id IS NULL AND product_per_kg_id IS NOT NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(restaurant_order_id);
            CREATE INDEX IF NOT EXISTS idx_orders_entry_time ON restaurant_orders(entry_time);
            ",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let tables: i64 = db
            .conn()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 8);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pos.db");

        {
            let db = Database::open(&path).unwrap();
            db.conn()
                .unwrap()
                .execute(
                    "INSERT INTO kg_prices (price, category) VALUES (12.5, 'Salad')",
                    [],
                )
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let category: String = db
            .conn()
            .unwrap()
            .query_row("SELECT category FROM kg_prices WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(category, "Salad");
    }

    #[test]
    fn test_generated_total_column() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn().unwrap();
        conn.execute(
            "INSERT INTO products_per_kg (weight, price_per_kg) VALUES (0.5, 40.0)",
            [],
        )
        .unwrap();

        let total: f64 = conn
            .query_row("SELECT total FROM products_per_kg WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert!((total - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_order_item_requires_exactly_one_target() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn().unwrap();
        conn.execute_batch(
            "
            INSERT INTO restaurant_orders (number, entry_time) VALUES (1, '2024-01-01 10:00:00');
            INSERT INTO products (name, price, stock) VALUES ('Soda', 5.0, 10);
            INSERT INTO products_per_kg (weight, price_per_kg) VALUES (1.0, 10.0);
            ",
        )
        .unwrap();

        let both = conn.execute(
            "INSERT INTO order_items (restaurant_order_id, product_id, product_per_kg_id) VALUES (1, 1, 1)",
            [],
        );
        assert!(both.is_err());

        let neither = conn.execute(
            "INSERT INTO order_items (restaurant_order_id) VALUES (1)",
            [],
        );
        assert!(neither.is_err());
    }

    #[test]
    fn test_one_open_order_per_number() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn().unwrap();
        conn.execute(
            "INSERT INTO restaurant_orders (number, entry_time) VALUES (5, '2024-01-01 10:00:00')",
            [],
        )
        .unwrap();

        let duplicate = conn.execute(
            "INSERT INTO restaurant_orders (number, entry_time) VALUES (5, '2024-01-01 11:00:00')",
            [],
        );
        assert!(duplicate.is_err());

        // Once the first order is closed the number can be reused
        conn.execute("UPDATE restaurant_orders SET status = 'Closed' WHERE id = 1", [])
            .unwrap();
        conn.execute(
            "INSERT INTO restaurant_orders (number, entry_time) VALUES (5, '2024-01-01 12:00:00')",
            [],
        )
        .unwrap();
    }
}
