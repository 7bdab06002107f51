use chrono::{Local, NaiveDateTime, SubsecRound};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{
    AddItemRequest, CheckinRequest, CheckoutRequest, FixedItemLine, ItemTarget, OrderItem,
    OrderItems, OrderStatus, OrderStatusHistory, Page, PerKgItemLine, RestaurantOrder,
};

pub const PAGE_SIZE: i64 = 100;

const DUPLICATE_OPEN: &str = "Order number already exists and is currently open.";

const ORDER_COLUMNS: &str =
    "id, number, entry_time, exit_time, status, note, payment_method, total_amount, paid";

const TOTAL_SQL: &str = "
    SELECT
        COALESCE((SELECT SUM(oi.quantity * p.price)
                  FROM order_items oi JOIN products p ON p.id = oi.product_id
                  WHERE oi.restaurant_order_id = ?1), 0.0)
      + COALESCE((SELECT SUM(oi.quantity * pk.price_per_kg * pk.weight)
                  FROM order_items oi JOIN products_per_kg pk ON pk.id = oi.product_per_kg_id
                  WHERE oi.restaurant_order_id = ?1), 0.0)";

/// Wall-clock time truncated to whole seconds, which keeps stored timestamps comparable as text.
pub(crate) fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<RestaurantOrder> {
    Ok(RestaurantOrder {
        id: row.get(0)?,
        number: row.get(1)?,
        entry_time: row.get(2)?,
        exit_time: row.get(3)?,
        status: row.get(4)?,
        note: row.get(5)?,
        payment_method: row.get(6)?,
        total_amount: row.get(7)?,
        paid: row.get(8)?,
    })
}

fn find_open(conn: &Connection, number: i64) -> AppResult<Option<RestaurantOrder>> {
    let order = conn
        .query_row(
            &format!("SELECT {ORDER_COLUMNS} FROM restaurant_orders WHERE number = ?1 AND status = ?2"),
            params![number, OrderStatus::Open],
            order_from_row,
        )
        .optional()?;
    Ok(order)
}

fn require_open(conn: &Connection, number: i64) -> AppResult<RestaurantOrder> {
    find_open(conn, number)?.ok_or_else(|| AppError::NotFound("Order not found.".to_string()))
}

fn record_status(
    conn: &Connection,
    order_id: i64,
    status: OrderStatus,
    at: NaiveDateTime,
    note: &str,
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO order_status_history (restaurant_order_id, status, change_time, note)
         VALUES (?1, ?2, ?3, ?4)",
        params![order_id, status, at, note],
    )?;
    Ok(())
}

fn compute_total(conn: &Connection, order_id: i64) -> AppResult<f64> {
    conn.query_row(TOTAL_SQL, [order_id], |row| row.get::<_, Option<f64>>(0))
        .optional()?
        .flatten()
        .ok_or_else(|| AppError::NotFound("Could not compute order total.".to_string()))
}

/// Opens a new order for a table number. The order and its first history row commit together.
pub fn checkin(db: &Database, req: &CheckinRequest) -> AppResult<RestaurantOrder> {
    let mut conn = db.conn()?;
    let tx = conn.transaction()?;

    if find_open(&tx, req.order_number)?.is_some() {
        return Err(AppError::Conflict(DUPLICATE_OPEN.to_string()));
    }

    let entry_time = now();
    let note = req.note.clone().unwrap_or_default();
    tx.execute(
        "INSERT INTO restaurant_orders (number, entry_time, status, note) VALUES (?1, ?2, ?3, ?4)",
        params![req.order_number, entry_time, OrderStatus::Open, note],
    )
    // The partial unique index catches a concurrent check-in that slipped past the lookup
    .map_err(|e| AppError::unique_or(e, DUPLICATE_OPEN))?;
    let order_id = tx.last_insert_rowid();

    record_status(&tx, order_id, OrderStatus::Open, entry_time, "Created")?;
    tx.commit()?;

    tracing::info!(order_number = req.order_number, order_id, "order checked in");
    Ok(RestaurantOrder {
        id: order_id,
        number: req.order_number,
        entry_time,
        exit_time: None,
        status: OrderStatus::Open,
        note,
        payment_method: None,
        total_amount: 0.0,
        paid: false,
    })
}

/// Adds a catalog entry to the open order. Stock is left untouched.
pub fn add_item(db: &Database, req: &AddItemRequest) -> AppResult<OrderItem> {
    let conn = db.conn()?;
    let order = require_open(&conn, req.order_number)?;
    let target = ItemTarget::from_ids(req.product_id, req.product_per_kg_id)?;

    let exists = match target {
        ItemTarget::ProductId(id) => conn
            .query_row("SELECT 1 FROM products WHERE id = ?1", [id], |_| Ok(()))
            .optional()?,
        ItemTarget::ProductPerKgId(id) => conn
            .query_row("SELECT 1 FROM products_per_kg WHERE id = ?1", [id], |_| Ok(()))
            .optional()?,
    };
    if exists.is_none() {
        return Err(AppError::NotFound("Product not found.".to_string()));
    }

    let quantity = req.quantity.unwrap_or(1);
    conn.execute(
        "INSERT INTO order_items (restaurant_order_id, product_id, product_per_kg_id, quantity)
         VALUES (?1, ?2, ?3, ?4)",
        params![order.id, target.product_id(), target.product_per_kg_id(), quantity],
    )?;

    tracing::debug!(order_number = order.number, order_id = order.id, ?target, quantity, "item added");
    Ok(OrderItem {
        id: conn.last_insert_rowid(),
        restaurant_order_id: order.id,
        target,
        quantity,
    })
}

/// Live total of an open order; zero when it has no items.
pub fn total(db: &Database, order_number: i64) -> AppResult<f64> {
    let conn = db.conn()?;
    let order = require_open(&conn, order_number)?;
    compute_total(&conn, order.id)
}

/// Closes the open order, snapshotting its total. All writes commit together.
pub fn checkout(db: &Database, req: &CheckoutRequest) -> AppResult<RestaurantOrder> {
    let mut conn = db.conn()?;
    let tx = conn.transaction()?;

    let order = require_open(&tx, req.order_number)?;
    let total_amount = compute_total(&tx, order.id)?;
    let exit_time = now();
    let note = req.note.clone().unwrap_or(order.note);

    tx.execute(
        "UPDATE restaurant_orders
         SET payment_method = ?1, note = ?2, status = ?3, exit_time = ?4, paid = 1, total_amount = ?5
         WHERE id = ?6",
        params![
            req.payment_method,
            note,
            OrderStatus::Closed,
            exit_time,
            total_amount,
            order.id
        ],
    )?;
    record_status(&tx, order.id, OrderStatus::Closed, exit_time, "Checked out")?;
    tx.commit()?;

    tracing::info!(
        order_number = order.number,
        order_id = order.id,
        total_amount,
        payment_method = %req.payment_method,
        "order checked out"
    );
    Ok(RestaurantOrder {
        exit_time: Some(exit_time),
        status: OrderStatus::Closed,
        note,
        payment_method: Some(req.payment_method),
        total_amount,
        paid: true,
        ..order
    })
}

/// Items of an open order joined with their catalog rows, plus the live total.
pub fn items(db: &Database, order_number: i64) -> AppResult<OrderItems> {
    let conn = db.conn()?;
    let order = require_open(&conn, order_number)?;

    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, p.category, p.price, oi.quantity
         FROM order_items oi JOIN products p ON p.id = oi.product_id
         WHERE oi.restaurant_order_id = ?1
         ORDER BY oi.id",
    )?;
    let products = stmt
        .query_map([order.id], |row| {
            Ok(FixedItemLine {
                product_id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                price: row.get(3)?,
                quantity: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT pk.id, pk.weight, pk.price_per_kg, pk.total, pk.category, oi.quantity
         FROM order_items oi JOIN products_per_kg pk ON pk.id = oi.product_per_kg_id
         WHERE oi.restaurant_order_id = ?1
         ORDER BY oi.id",
    )?;
    let products_per_kg = stmt
        .query_map([order.id], |row| {
            Ok(PerKgItemLine {
                product_per_kg_id: row.get(0)?,
                weight: row.get(1)?,
                price_per_kg: row.get(2)?,
                total: row.get(3)?,
                category: row.get(4)?,
                quantity: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OrderItems {
        total: compute_total(&conn, order.id)?,
        products,
        products_per_kg,
    })
}

fn list_by_status(db: &Database, status: OrderStatus, offset: i64) -> AppResult<Page<RestaurantOrder>> {
    let conn = db.conn()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORDER_COLUMNS} FROM restaurant_orders WHERE status = ?1 ORDER BY id LIMIT ?2 OFFSET ?3"
    ))?;
    let orders = stmt
        .query_map(params![status, PAGE_SIZE, offset], order_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page::from_rows(orders, PAGE_SIZE, offset))
}

pub fn list_open(db: &Database, offset: i64) -> AppResult<Page<RestaurantOrder>> {
    list_by_status(db, OrderStatus::Open, offset)
}

pub fn list_closed(db: &Database, offset: i64) -> AppResult<Page<RestaurantOrder>> {
    list_by_status(db, OrderStatus::Closed, offset)
}

/// Status transitions of an order, oldest first.
pub fn history(db: &Database, order_id: i64) -> AppResult<Vec<OrderStatusHistory>> {
    let conn = db.conn()?;
    let mut stmt = conn.prepare(
        "SELECT id, restaurant_order_id, status, change_time, note
         FROM order_status_history WHERE restaurant_order_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([order_id], |row| {
            Ok(OrderStatusHistory {
                id: row.get(0)?,
                restaurant_order_id: row.get(1)?,
                status: row.get(2)?,
                change_time: row.get(3)?,
                note: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
