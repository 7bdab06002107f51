use rusqlite::{params, OptionalExtension, Row};

use crate::commands::orders::PAGE_SIZE;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{CreateProduct, Page, Product, UpdateProduct};

const PRODUCT_COLUMNS: &str = "id, name, description, price, category, stock, active";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        category: row.get(4)?,
        stock: row.get(5)?,
        active: row.get(6)?,
    })
}

fn not_found() -> AppError {
    AppError::NotFound("Product not found.".to_string())
}

pub fn get_products(db: &Database, offset: i64) -> AppResult<Page<Product>> {
    let conn = db.conn()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id LIMIT ?1 OFFSET ?2"
    ))?;
    let products = stmt
        .query_map(params![PAGE_SIZE, offset], product_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page::from_rows(products, PAGE_SIZE, offset))
}

pub fn get_product(db: &Database, id: i64) -> AppResult<Product> {
    let conn = db.conn()?;
    conn.query_row(
        &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
        [id],
        product_from_row,
    )
    .optional()?
    .ok_or_else(not_found)
}

pub fn create_product(db: &Database, product: &CreateProduct) -> AppResult<Product> {
    let created = {
        let conn = db.conn()?;
        conn.execute(
            "INSERT INTO products (name, description, price, category, stock, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                product.name,
                product.description.clone().unwrap_or_default(),
                product.price,
                product.category.clone().unwrap_or_default(),
                product.stock,
                product.active.unwrap_or(false)
            ],
        )?;
        conn.last_insert_rowid()
    };

    tracing::info!(product_id = created, name = %product.name, "product created");
    get_product(db, created)
}

pub fn update_product(db: &Database, product: &UpdateProduct) -> AppResult<Product> {
    {
        let conn = db.conn()?;
        let changed = conn.execute(
            "UPDATE products SET
                name = COALESCE(?1, name),
                description = COALESCE(?2, description),
                price = COALESCE(?3, price),
                category = COALESCE(?4, category),
                stock = COALESCE(?5, stock),
                active = COALESCE(?6, active)
             WHERE id = ?7",
            params![
                product.name,
                product.description,
                product.price,
                product.category,
                product.stock,
                product.active,
                product.id
            ],
        )?;
        if changed == 0 {
            return Err(not_found());
        }
    }

    get_product(db, product.id)
}

pub fn delete_product(db: &Database, id: i64) -> AppResult<()> {
    let conn = db.conn()?;
    let deleted = conn
        .execute("DELETE FROM products WHERE id = ?1", [id])
        .map_err(|e| AppError::foreign_key_or(e, "Product is still referenced by order items."))?;
    if deleted == 0 {
        return Err(not_found());
    }

    tracing::info!(product_id = id, "product deleted");
    Ok(())
}
