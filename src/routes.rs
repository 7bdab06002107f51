//! HTTP surface: application state, route table and handlers.
//!
//! Every business route sits behind a [`RoleGate`]. Bodies are JSON on every method, GET
//! included; listings accept an empty body.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::commands::statistics::StatsWindow;
use crate::commands::{auth, kg_prices, orders, product_per_kg, products, statistics};
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::gate::{self, RoleGate, ADMIN, ALL_ROLES, FRONT_OF_HOUSE};
use crate::models::{
    AddItemRequest, CheckinRequest, CheckoutRequest, CreateKgPrice, CreateProduct,
    CreateProductPerKg, DeleteUser, EditUser, IdRequest, LoginRequest, OrderNumberRequest,
    Page, PageRequest, RegisterUser, UpdateKgPrice, UpdateProduct, UpdateProductPerKg, User,
};
use crate::security::{PasswordHasher, TokenService};
use crate::validation::Valid;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub tokens: Arc<TokenService>,
    pub hasher: Arc<PasswordHasher>,
}

impl AppState {
    pub fn new(db: Database, tokens: TokenService, hasher: PasswordHasher) -> Self {
        Self {
            db: Arc::new(db),
            tokens: Arc::new(tokens),
            hasher: Arc::new(hasher),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh));

    let admin = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/edit", post(edit_user))
        .route("/auth/delete", delete(delete_user))
        .route("/auth/get", get(list_users))
        .route("/product/create", post(create_product))
        .route("/product/update", post(update_product))
        .route("/product/delete", delete(delete_product))
        .route("/product_per_kg/update", post(update_product_per_kg))
        .route("/product_per_kg/delete", delete(delete_product_per_kg))
        .route("/kg_price/create", post(create_kg_price))
        .route("/kg_price/update", post(update_kg_price))
        .route("/kg_price/delete", delete(delete_kg_price))
        .route_layer(from_fn_with_state(
            RoleGate::new(state.clone(), ADMIN),
            gate::require_roles,
        ));

    let front_of_house = Router::new()
        .route("/order/checkin", post(checkin))
        .route("/order/add_item", post(add_item))
        .route("/order/checkout", post(checkout))
        .route("/order/total", get(order_total))
        .route_layer(from_fn_with_state(
            RoleGate::new(state.clone(), FRONT_OF_HOUSE),
            gate::require_roles,
        ));

    let staff = Router::new()
        .route("/order/items", get(order_items))
        .route("/order/open_orders", get(open_orders))
        .route("/order/closed_orders", get(closed_orders))
        .route("/product/get", get(get_products))
        .route("/product_per_kg/create", post(create_product_per_kg))
        .route("/product_per_kg/get", get(get_products_per_kg))
        .route("/kg_price/get", get(get_kg_prices))
        .route("/statistics/order/day", get(day_stats))
        .route("/statistics/order/week", get(week_stats))
        .route("/statistics/order/month", get(month_stats))
        .route("/statistics/order/year", get(year_stats))
        .route("/statistics/order/lifetime", get(lifetime_stats))
        .route("/statistics/product/stock", get(stock_summary))
        .route_layer(from_fn_with_state(
            RoleGate::new(state.clone(), ALL_ROLES),
            gate::require_roles,
        ));

    Router::new()
        .merge(public)
        .merge(admin)
        .merge(front_of_house)
        .merge(staff)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// `{success, <key>: [...], has_next, next_page_offset?}`
fn page_body<T: Serialize>(message: &str, key: &str, page: Page<T>) -> Value {
    let mut body = json!({
        "success": message,
        "has_next": page.has_next,
    });
    body[key] = json!(page.items);
    if let Some(next) = page.next_page_offset {
        body["next_page_offset"] = json!(next);
    }
    body
}

/// Runs password hashing work off the async worker threads.
async fn blocking<T, F>(work: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
}

// ===== Auth =====

async fn login(State(state): State<AppState>, Valid(req): Valid<LoginRequest>) -> AppResult<Json<Value>> {
    let pair = blocking(move || auth::login(&state.db, &state.hasher, &state.tokens, &req)).await?;
    Ok(Json(json!({
        "success": "Logged in successfully.",
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
    })))
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let token = gate::bearer_token(&headers)?;
    let access_token = auth::refresh(&state.db, &state.tokens, token)?;
    Ok(Json(json!({
        "success": "Token refreshed.",
        "access_token": access_token,
    })))
}

async fn register(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    Valid(req): Valid<RegisterUser>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = blocking(move || auth::register(&state.db, &state.hasher, &req)).await?;
    tracing::info!(by = %caller.username, username = %user.username, "account created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": "User registered successfully.", "user": user })),
    ))
}

async fn edit_user(State(state): State<AppState>, Valid(req): Valid<EditUser>) -> AppResult<Json<Value>> {
    let user = blocking(move || auth::edit(&state.db, &state.hasher, &req)).await?;
    Ok(Json(json!({ "success": "User updated successfully.", "user": user })))
}

async fn delete_user(State(state): State<AppState>, Valid(req): Valid<DeleteUser>) -> AppResult<Json<Value>> {
    auth::delete(&state.db, &req)?;
    Ok(Json(json!({ "success": "User deleted successfully." })))
}

async fn list_users(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let users = auth::list(&state.db)?;
    Ok(Json(json!({ "success": "All users", "users": users })))
}

// ===== Orders =====

async fn checkin(State(state): State<AppState>, Valid(req): Valid<CheckinRequest>) -> AppResult<Json<Value>> {
    let order = orders::checkin(&state.db, &req)?;
    Ok(Json(json!({ "success": "Checked in successfully.", "order": order })))
}

async fn add_item(State(state): State<AppState>, Valid(req): Valid<AddItemRequest>) -> AppResult<Json<Value>> {
    let item = orders::add_item(&state.db, &req)?;
    Ok(Json(json!({ "success": "Item added successfully.", "new_item": item })))
}

async fn checkout(State(state): State<AppState>, Valid(req): Valid<CheckoutRequest>) -> AppResult<Json<Value>> {
    let order = orders::checkout(&state.db, &req)?;
    Ok(Json(json!({ "success": "Checked out successfully.", "order": order })))
}

async fn order_total(
    State(state): State<AppState>,
    Valid(req): Valid<OrderNumberRequest>,
) -> AppResult<Json<Value>> {
    let total = orders::total(&state.db, req.order_number)?;
    Ok(Json(json!({ "success": "Order total retrieved.", "total": total })))
}

async fn order_items(
    State(state): State<AppState>,
    Valid(req): Valid<OrderNumberRequest>,
) -> AppResult<Json<Value>> {
    let items = orders::items(&state.db, req.order_number)?;
    Ok(Json(json!({
        "success": "All order items",
        "total": items.total,
        "products": items.products,
        "products_per_kg": items.products_per_kg,
    })))
}

async fn open_orders(State(state): State<AppState>, Valid(req): Valid<PageRequest>) -> AppResult<Json<Value>> {
    let page = orders::list_open(&state.db, req.offset.unwrap_or(0))?;
    Ok(Json(page_body("Open orders", "orders", page)))
}

async fn closed_orders(State(state): State<AppState>, Valid(req): Valid<PageRequest>) -> AppResult<Json<Value>> {
    let page = orders::list_closed(&state.db, req.offset.unwrap_or(0))?;
    Ok(Json(page_body("Closed orders", "orders", page)))
}

// ===== Catalog =====

async fn create_product(
    State(state): State<AppState>,
    Valid(req): Valid<CreateProduct>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let product = products::create_product(&state.db, &req)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": "Product created successfully.", "product": product })),
    ))
}

async fn update_product(
    State(state): State<AppState>,
    Valid(req): Valid<UpdateProduct>,
) -> AppResult<Json<Value>> {
    let product = products::update_product(&state.db, &req)?;
    Ok(Json(json!({ "success": "Product updated successfully.", "product": product })))
}

async fn delete_product(State(state): State<AppState>, Valid(req): Valid<IdRequest>) -> AppResult<Json<Value>> {
    products::delete_product(&state.db, req.id)?;
    Ok(Json(json!({ "success": "Product deleted successfully." })))
}

async fn get_products(State(state): State<AppState>, Valid(req): Valid<PageRequest>) -> AppResult<Json<Value>> {
    let page = products::get_products(&state.db, req.offset.unwrap_or(0))?;
    Ok(Json(page_body("All products", "products", page)))
}

async fn create_product_per_kg(
    State(state): State<AppState>,
    Valid(req): Valid<CreateProductPerKg>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let item = product_per_kg::create_product_per_kg(&state.db, &req)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": "Product per kg created successfully.", "product_per_kg": item })),
    ))
}

async fn update_product_per_kg(
    State(state): State<AppState>,
    Valid(req): Valid<UpdateProductPerKg>,
) -> AppResult<Json<Value>> {
    let item = product_per_kg::update_product_per_kg(&state.db, &req)?;
    Ok(Json(json!({ "success": "Product per kg updated successfully.", "product_per_kg": item })))
}

async fn delete_product_per_kg(
    State(state): State<AppState>,
    Valid(req): Valid<IdRequest>,
) -> AppResult<Json<Value>> {
    product_per_kg::delete_product_per_kg(&state.db, req.id)?;
    Ok(Json(json!({ "success": "Product per kg deleted successfully." })))
}

async fn get_products_per_kg(
    State(state): State<AppState>,
    Valid(req): Valid<PageRequest>,
) -> AppResult<Json<Value>> {
    let page = product_per_kg::get_products_per_kg(&state.db, req.offset.unwrap_or(0))?;
    Ok(Json(page_body("All products per kg", "products_per_kg", page)))
}

async fn create_kg_price(
    State(state): State<AppState>,
    Valid(req): Valid<CreateKgPrice>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let price = kg_prices::create_kg_price(&state.db, &req)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": "Kg price created successfully.", "kg_price": price })),
    ))
}

async fn update_kg_price(
    State(state): State<AppState>,
    Valid(req): Valid<UpdateKgPrice>,
) -> AppResult<Json<Value>> {
    let price = kg_prices::update_kg_price(&state.db, &req)?;
    Ok(Json(json!({ "success": "Kg price updated successfully.", "kg_price": price })))
}

async fn delete_kg_price(State(state): State<AppState>, Valid(req): Valid<IdRequest>) -> AppResult<Json<Value>> {
    kg_prices::delete_kg_price(&state.db, req.id)?;
    Ok(Json(json!({ "success": "Kg price deleted successfully." })))
}

async fn get_kg_prices(State(state): State<AppState>, Valid(req): Valid<PageRequest>) -> AppResult<Json<Value>> {
    let page = kg_prices::get_kg_prices(&state.db, req.offset.unwrap_or(0))?;
    Ok(Json(page_body("All kg prices", "kg_prices", page)))
}

// ===== Statistics =====

fn window_response(state: &AppState, window: StatsWindow) -> AppResult<Json<Value>> {
    let stats = statistics::named_window(&state.db, window)?;
    Ok(Json(json!({
        "success": "Order stats",
        "payment_summary": stats.payment_summary,
        "order_stats": stats.order_stats,
    })))
}

async fn day_stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    window_response(&state, StatsWindow::Day)
}

async fn week_stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    window_response(&state, StatsWindow::Week)
}

async fn month_stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    window_response(&state, StatsWindow::Month)
}

async fn year_stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    window_response(&state, StatsWindow::Year)
}

async fn lifetime_stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    window_response(&state, StatsWindow::Lifetime)
}

async fn stock_summary(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let summary = statistics::stock_summary(&state.db)?;
    Ok(Json(json!({
        "success": "Stock summary",
        "total_stock_value": summary.total_stock_value,
        "product_count": summary.product_count,
    })))
}
