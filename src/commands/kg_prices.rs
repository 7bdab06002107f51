use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::commands::orders::PAGE_SIZE;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{CreateKgPrice, KgPrice, Page, UpdateKgPrice};

fn kg_price_from_row(row: &Row<'_>) -> rusqlite::Result<KgPrice> {
    Ok(KgPrice {
        id: row.get(0)?,
        price: row.get(1)?,
        category: row.get(2)?,
    })
}

pub(crate) fn find_kg_price(conn: &Connection, id: i64) -> AppResult<KgPrice> {
    conn.query_row(
        "SELECT id, price, category FROM kg_prices WHERE id = ?1",
        [id],
        kg_price_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound("Kg price not found.".to_string()))
}

pub fn get_kg_prices(db: &Database, offset: i64) -> AppResult<Page<KgPrice>> {
    let conn = db.conn()?;
    let mut stmt =
        conn.prepare("SELECT id, price, category FROM kg_prices ORDER BY id LIMIT ?1 OFFSET ?2")?;
    let prices = stmt
        .query_map(params![PAGE_SIZE, offset], kg_price_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page::from_rows(prices, PAGE_SIZE, offset))
}

pub fn create_kg_price(db: &Database, price: &CreateKgPrice) -> AppResult<KgPrice> {
    let conn = db.conn()?;
    conn.execute(
        "INSERT INTO kg_prices (price, category) VALUES (?1, ?2)",
        params![price.price, price.category],
    )?;

    let id = conn.last_insert_rowid();
    tracing::info!(kg_price_id = id, category = %price.category, "kg price created");
    Ok(KgPrice {
        id,
        price: price.price,
        category: price.category.clone(),
    })
}

/// Existing per-kg products keep the price they copied at creation.
pub fn update_kg_price(db: &Database, price: &UpdateKgPrice) -> AppResult<KgPrice> {
    let conn = db.conn()?;
    let changed = conn.execute(
        "UPDATE kg_prices SET price = COALESCE(?1, price), category = COALESCE(?2, category)
         WHERE id = ?3",
        params![price.price, price.category, price.id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound("Kg price not found.".to_string()));
    }
    find_kg_price(&conn, price.id)
}

pub fn delete_kg_price(db: &Database, id: i64) -> AppResult<()> {
    let conn = db.conn()?;
    if conn.execute("DELETE FROM kg_prices WHERE id = ?1", [id])? == 0 {
        return Err(AppError::NotFound("Kg price not found.".to_string()));
    }
    tracing::info!(kg_price_id = id, "kg price deleted");
    Ok(())
}
