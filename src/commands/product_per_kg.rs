use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::commands::kg_prices::find_kg_price;
use crate::commands::orders::PAGE_SIZE;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{CreateProductPerKg, Page, ProductPerKg, UpdateProductPerKg};

const COLUMNS: &str = "id, description, weight, price_per_kg, category, total";

fn product_per_kg_from_row(row: &Row<'_>) -> rusqlite::Result<ProductPerKg> {
    Ok(ProductPerKg {
        id: row.get(0)?,
        description: row.get(1)?,
        weight: row.get(2)?,
        price_per_kg: row.get(3)?,
        category: row.get(4)?,
        total: row.get(5)?,
    })
}

fn find(conn: &Connection, id: i64) -> AppResult<ProductPerKg> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM products_per_kg WHERE id = ?1"),
        [id],
        product_per_kg_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound("Product per kg not found.".to_string()))
}

pub fn get_products_per_kg(db: &Database, offset: i64) -> AppResult<Page<ProductPerKg>> {
    let conn = db.conn()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM products_per_kg ORDER BY id LIMIT ?1 OFFSET ?2"
    ))?;
    let rows = stmt
        .query_map(params![PAGE_SIZE, offset], product_per_kg_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page::from_rows(rows, PAGE_SIZE, offset))
}

/// Weighs a plate at the current price of its kg-price category.
pub fn create_product_per_kg(db: &Database, item: &CreateProductPerKg) -> AppResult<ProductPerKg> {
    let conn = db.conn()?;
    let kg_price = find_kg_price(&conn, item.kg_price_id)?;

    conn.execute(
        "INSERT INTO products_per_kg (description, weight, price_per_kg, category)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            item.description.clone().unwrap_or_default(),
            item.weight,
            kg_price.price,
            kg_price.category
        ],
    )?;

    let created = find(&conn, conn.last_insert_rowid())?;
    tracing::info!(
        product_per_kg_id = created.id,
        weight = created.weight,
        total = created.total,
        "product per kg created"
    );
    Ok(created)
}

pub fn update_product_per_kg(db: &Database, item: &UpdateProductPerKg) -> AppResult<ProductPerKg> {
    let conn = db.conn()?;
    let current = find(&conn, item.id)?;

    let (price_per_kg, category) = match item.kg_price_id {
        Some(kg_price_id) => {
            let kg_price = find_kg_price(&conn, kg_price_id)?;
            (kg_price.price, kg_price.category)
        }
        None => (current.price_per_kg, current.category),
    };

    conn.execute(
        "UPDATE products_per_kg SET description = ?1, weight = ?2, price_per_kg = ?3, category = ?4
         WHERE id = ?5",
        params![
            item.description.clone().unwrap_or(current.description),
            item.weight.unwrap_or(current.weight),
            price_per_kg,
            category,
            item.id
        ],
    )?;

    find(&conn, item.id)
}

pub fn delete_product_per_kg(db: &Database, id: i64) -> AppResult<()> {
    let conn = db.conn()?;
    let deleted = conn
        .execute("DELETE FROM products_per_kg WHERE id = ?1", [id])
        .map_err(|e| {
            AppError::foreign_key_or(e, "Product per kg is still referenced by order items.")
        })?;
    if deleted == 0 {
        return Err(AppError::NotFound("Product per kg not found.".to_string()));
    }
    tracing::info!(product_per_kg_id = id, "product per kg deleted");
    Ok(())
}
