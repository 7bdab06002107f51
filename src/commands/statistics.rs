use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::params;

use crate::commands::orders::now;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::{OrderStats, PaymentSummary, StockSummary, WindowStats};

/// Named reporting windows, each ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsWindow {
    Day,
    Week,
    Month,
    Year,
    Lifetime,
}

impl StatsWindow {
    pub fn bounds(self, end: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let start = match self {
            StatsWindow::Day => end - Duration::days(1),
            StatsWindow::Week => end - Duration::days(7),
            StatsWindow::Month => end - Duration::days(30),
            StatsWindow::Year => end - Duration::days(365),
            StatsWindow::Lifetime => lifetime_start(),
        };
        (start, end)
    }
}

fn lifetime_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Aggregates over paid orders whose entry time lies in `[start, end]`.
pub fn window_stats(db: &Database, start: NaiveDateTime, end: NaiveDateTime) -> AppResult<WindowStats> {
    let conn = db.conn()?;

    let mut stmt = conn.prepare(
        "SELECT payment_method, COUNT(*), COALESCE(SUM(total_amount), 0)
         FROM restaurant_orders
         WHERE paid = 1 AND payment_method IS NOT NULL AND entry_time BETWEEN ?1 AND ?2
         GROUP BY payment_method
         ORDER BY payment_method",
    )?;
    let payment_summary = stmt
        .query_map(params![start, end], |row| {
            Ok(PaymentSummary {
                payment_method: row.get(0)?,
                count: row.get(1)?,
                total_sum: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let stats = conn.query_row(
        "SELECT COUNT(*),
                SUM(total_amount), AVG(total_amount), MAX(total_amount), MIN(total_amount),
                SUM(duration), AVG(duration), MAX(duration), MIN(duration)
         FROM (
             SELECT total_amount,
                    CAST(ROUND((julianday(exit_time) - julianday(entry_time)) * 86400) AS INTEGER)
                        AS duration
             FROM restaurant_orders
             WHERE paid = 1 AND entry_time BETWEEN ?1 AND ?2
         )",
        params![start, end],
        |row| {
            Ok(OrderStats {
                order_count: row.get(0)?,
                total_sum: row.get(1)?,
                average_amount: row.get(2)?,
                max_amount: row.get(3)?,
                min_amount: row.get(4)?,
                total_duration_seconds: row.get(5)?,
                average_duration_seconds: row.get(6)?,
                max_duration_seconds: row.get(7)?,
                min_duration_seconds: row.get(8)?,
            })
        },
    )?;
    let order_stats = (stats.order_count > 0).then_some(stats);

    if payment_summary.is_empty() && order_stats.is_none() {
        return Err(AppError::NotFound("No stats available.".to_string()));
    }
    Ok(WindowStats {
        payment_summary,
        order_stats,
    })
}

pub fn named_window(db: &Database, window: StatsWindow) -> AppResult<WindowStats> {
    let (start, end) = window.bounds(now());
    tracing::debug!(?window, %start, %end, "computing window stats");
    window_stats(db, start, end)
}

pub fn stock_summary(db: &Database) -> AppResult<StockSummary> {
    let conn = db.conn()?;
    let summary = conn.query_row(
        "SELECT COALESCE(SUM(price * stock), 0.0), COUNT(*) FROM products",
        [],
        |row| {
            Ok(StockSummary {
                total_stock_value: row.get(0)?,
                product_count: row.get(1)?,
            })
        },
    )?;
    Ok(summary)
}
