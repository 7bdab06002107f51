use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Implements text conversions and SQLite column mapping for a unit-only enum.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Waiter,
    Cook,
    Cashier,
}

text_enum!(UserRole {
    Admin => "Admin",
    Waiter => "Waiter",
    Cook => "Cook",
    Cashier => "Cashier",
});

/// `Cancelled` is modelled but no operation transitions an order into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Closed,
    Cancelled,
}

text_enum!(OrderStatus {
    Open => "Open",
    Closed => "Closed",
    Cancelled => "Cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Card,
    Pix,
    Others,
}

text_enum!(PaymentMethod {
    Cash => "Cash",
    Card => "Card",
    Pix => "Pix",
    Others => "Others",
});

// ===== Users & tokens =====

#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub active: bool,
}

/// Allow-list row: the single refresh token currently honoured for a user.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub user_id: i64,
    pub jti: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub active: bool,
    pub user_role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct EditUser {
    pub username: String,
    pub new_username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub active: Option<bool>,
    pub user_role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteUser {
    pub username: String,
}

// ===== Orders =====

#[derive(Debug, Serialize, Clone)]
pub struct RestaurantOrder {
    pub id: i64,
    pub number: i64,
    pub entry_time: NaiveDateTime,
    pub exit_time: Option<NaiveDateTime>,
    pub status: OrderStatus,
    pub note: String,
    pub payment_method: Option<PaymentMethod>,
    pub total_amount: f64,
    pub paid: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub restaurant_order_id: i64,
    pub status: OrderStatus,
    pub change_time: NaiveDateTime,
    pub note: String,
}

/// What an order item points at. Exactly one catalog reference, never both.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemTarget {
    ProductId(i64),
    ProductPerKgId(i64),
}

impl ItemTarget {
    pub fn from_ids(product_id: Option<i64>, product_per_kg_id: Option<i64>) -> AppResult<Self> {
        match (product_id, product_per_kg_id) {
            (Some(id), None) => Ok(ItemTarget::ProductId(id)),
            (None, Some(id)) => Ok(ItemTarget::ProductPerKgId(id)),
            _ => Err(AppError::Conflict(
                "Either 'product_id' or 'product_per_kg_id' must be provided, but not both."
                    .to_string(),
            )),
        }
    }

    pub fn product_id(&self) -> Option<i64> {
        match self {
            ItemTarget::ProductId(id) => Some(*id),
            ItemTarget::ProductPerKgId(_) => None,
        }
    }

    pub fn product_per_kg_id(&self) -> Option<i64> {
        match self {
            ItemTarget::ProductId(_) => None,
            ItemTarget::ProductPerKgId(id) => Some(*id),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct OrderItem {
    pub id: i64,
    pub restaurant_order_id: i64,
    #[serde(flatten)]
    pub target: ItemTarget,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    pub order_number: i64,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub order_number: i64,
    pub quantity: Option<i64>,
    pub product_id: Option<i64>,
    pub product_per_kg_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub order_number: i64,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderNumberRequest {
    pub order_number: i64,
}

#[derive(Debug, Deserialize, Default)]
pub struct PageRequest {
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct FixedItemLine {
    pub product_id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub quantity: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PerKgItemLine {
    pub product_per_kg_id: i64,
    pub weight: f64,
    pub price_per_kg: f64,
    pub total: f64,
    pub category: String,
    pub quantity: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct OrderItems {
    pub total: f64,
    pub products: Vec<FixedItemLine>,
    pub products_per_kg: Vec<PerKgItemLine>,
}

/// One page of a listing. A short page means there is nothing after it.
#[derive(Debug, Serialize, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_next: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_offset: Option<i64>,
}

impl<T> Page<T> {
    pub fn from_rows(items: Vec<T>, limit: i64, offset: i64) -> Self {
        let has_next = items.len() as i64 == limit;
        Page {
            items,
            has_next,
            next_page_offset: has_next.then_some(offset + limit),
        }
    }
}

// ===== Catalog =====

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub stock: i64,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub price: f64,
    pub stock: i64,
    pub category: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProduct {
    pub id: i64,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
}

/// `total` is a stored column computed by SQLite as `weight * price_per_kg`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProductPerKg {
    pub id: i64,
    pub description: String,
    pub weight: f64,
    pub price_per_kg: f64,
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductPerKg {
    pub weight: f64,
    pub kg_price_id: i64,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductPerKg {
    pub id: i64,
    pub weight: Option<f64>,
    pub kg_price_id: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct KgPrice {
    pub id: i64,
    pub price: f64,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateKgPrice {
    pub price: f64,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateKgPrice {
    pub id: i64,
    pub price: Option<f64>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdRequest {
    pub id: i64,
}

// ===== Statistics =====

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PaymentSummary {
    pub payment_method: PaymentMethod,
    pub count: i64,
    pub total_sum: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct OrderStats {
    pub order_count: i64,
    pub total_sum: Option<f64>,
    pub average_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub min_amount: Option<f64>,
    pub total_duration_seconds: Option<i64>,
    pub average_duration_seconds: Option<f64>,
    pub max_duration_seconds: Option<i64>,
    pub min_duration_seconds: Option<i64>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct WindowStats {
    pub payment_summary: Vec<PaymentSummary>,
    pub order_stats: Option<OrderStats>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct StockSummary {
    pub total_stock_value: f64,
    pub product_count: i64,
}
