//! Request-body validation.
//!
//! Bodies are deserialized into typed DTOs; each DTO then runs its field checks in order and
//! stops at the first failure. Both stages report `AppError::Validation`.

use std::sync::LazyLock;

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};
use crate::models::{
    AddItemRequest, CheckinRequest, CheckoutRequest, CreateKgPrice, CreateProduct,
    CreateProductPerKg, DeleteUser, EditUser, IdRequest, LoginRequest, OrderNumberRequest,
    PageRequest, RegisterUser, UpdateKgPrice, UpdateProduct, UpdateProductPerKg,
};

const MAX_TEXT_CHARS: usize = 255;

// Length is bounded separately: a counted repetition over Unicode `\w` exceeds the
// compiled size limit.
static TEXT: LazyLock<Regex> = LazyLock::new(|| text_pattern(r"^[\w\s]*$"));
static USERNAME: LazyLock<Regex> = LazyLock::new(|| text_pattern(r"^[\w\s-]*$"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| text_pattern(r"^[\w\-.]+@([\w-]+\.)+[\w-]{2,4}$"));

fn text_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

pub trait Validate {
    fn validate(&self) -> AppResult<()>;
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Validation(message.into())
}

pub fn positive(field: &str, value: i64) -> AppResult<()> {
    if value <= 0 {
        return Err(invalid(format!("{field} must be greater than zero.")));
    }
    Ok(())
}

pub fn non_negative(field: &str, value: i64) -> AppResult<()> {
    if value < 0 {
        return Err(invalid(format!("{field} must be greater or equal to zero.")));
    }
    Ok(())
}

pub fn positive_amount(field: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(format!("{field} must be greater than zero.")));
    }
    Ok(())
}

fn matches(field: &str, value: &str, pattern: &Regex, min_chars: usize) -> AppResult<()> {
    let len = value.chars().count();
    if len < min_chars || len > MAX_TEXT_CHARS || !pattern.is_match(value) {
        return Err(invalid(format!("Invalid {field} format.")));
    }
    Ok(())
}

/// Notes, descriptions and optional categories: word characters and spaces, up to 255.
pub fn short_text(field: &str, value: &str) -> AppResult<()> {
    matches(field, value, &TEXT, 0)
}

/// Names and required categories: 1 to 255 word characters and spaces.
pub fn label(field: &str, value: &str) -> AppResult<()> {
    matches(field, value, &TEXT, 1)
}

pub fn username(field: &str, value: &str) -> AppResult<()> {
    matches(field, value, &USERNAME, 1)
}

pub fn email(value: &str) -> AppResult<()> {
    matches("email", value, &EMAIL, 1)
}

pub fn password(value: &str) -> AppResult<()> {
    if value.chars().count() < 8 {
        return Err(invalid("Password must be at least 8 characters long."));
    }
    Ok(())
}

fn optional<T: ?Sized>(value: Option<&T>, check: impl FnOnce(&T) -> AppResult<()>) -> AppResult<()> {
    value.map_or(Ok(()), check)
}

impl Validate for LoginRequest {
    fn validate(&self) -> AppResult<()> {
        username("username", &self.username)?;
        password(&self.password)
    }
}

impl Validate for RegisterUser {
    fn validate(&self) -> AppResult<()> {
        label("name", &self.name)?;
        email(&self.email)?;
        username("username", &self.username)?;
        password(&self.password)
    }
}

impl Validate for EditUser {
    fn validate(&self) -> AppResult<()> {
        username("username", &self.username)?;
        optional(self.new_username.as_deref(), |v| username("new_username", v))?;
        optional(self.name.as_deref(), |v| label("name", v))?;
        optional(self.email.as_deref(), email)?;
        optional(self.password.as_deref(), password)
    }
}

impl Validate for DeleteUser {
    fn validate(&self) -> AppResult<()> {
        username("username", &self.username)
    }
}

impl Validate for CheckinRequest {
    fn validate(&self) -> AppResult<()> {
        positive("order_number", self.order_number)?;
        optional(self.note.as_deref(), |v| short_text("note", v))
    }
}

impl Validate for AddItemRequest {
    fn validate(&self) -> AppResult<()> {
        positive("order_number", self.order_number)?;
        optional(self.quantity.as_ref(), |v| positive("quantity", *v))
    }
}

impl Validate for CheckoutRequest {
    fn validate(&self) -> AppResult<()> {
        positive("order_number", self.order_number)?;
        optional(self.note.as_deref(), |v| short_text("note", v))
    }
}

impl Validate for OrderNumberRequest {
    fn validate(&self) -> AppResult<()> {
        positive("order_number", self.order_number)
    }
}

impl Validate for PageRequest {
    fn validate(&self) -> AppResult<()> {
        optional(self.offset.as_ref(), |v| non_negative("offset", *v))
    }
}

impl Validate for IdRequest {
    fn validate(&self) -> AppResult<()> {
        Ok(())
    }
}

impl Validate for CreateProduct {
    fn validate(&self) -> AppResult<()> {
        label("name", &self.name)?;
        positive_amount("price", self.price)?;
        non_negative("stock", self.stock)?;
        optional(self.category.as_deref(), |v| short_text("category", v))?;
        optional(self.description.as_deref(), |v| short_text("description", v))
    }
}

impl Validate for UpdateProduct {
    fn validate(&self) -> AppResult<()> {
        optional(self.name.as_deref(), |v| label("name", v))?;
        optional(self.price.as_ref(), |v| positive_amount("price", *v))?;
        optional(self.stock.as_ref(), |v| non_negative("stock", *v))?;
        optional(self.category.as_deref(), |v| short_text("category", v))?;
        optional(self.description.as_deref(), |v| short_text("description", v))
    }
}

impl Validate for CreateKgPrice {
    fn validate(&self) -> AppResult<()> {
        positive_amount("price", self.price)?;
        label("category", &self.category)
    }
}

impl Validate for UpdateKgPrice {
    fn validate(&self) -> AppResult<()> {
        optional(self.price.as_ref(), |v| positive_amount("price", *v))?;
        optional(self.category.as_deref(), |v| short_text("category", v))
    }
}

impl Validate for CreateProductPerKg {
    fn validate(&self) -> AppResult<()> {
        positive_amount("weight", self.weight)?;
        optional(self.description.as_deref(), |v| short_text("description", v))
    }
}

impl Validate for UpdateProductPerKg {
    fn validate(&self) -> AppResult<()> {
        optional(self.weight.as_ref(), |v| positive_amount("weight", *v))?;
        optional(self.description.as_deref(), |v| short_text("description", v))
    }
}

/// Parses a JSON body into `T` and runs its checks. An empty body is read as `{}`, so DTOs
/// whose fields are all optional (pagination) accept bodiless GET requests.
pub fn parse_body<T>(body: &[u8]) -> AppResult<T>
where
    T: DeserializeOwned + Validate,
{
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };

    let value: T = serde_json::from_slice(body)
        .map_err(|e| invalid(format!("Invalid request body: {e}")))?;
    value.validate()?;
    Ok(value)
}

/// Extractor yielding a deserialized and validated request body.
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| invalid(format!("Could not read request body: {e}")))?;
        parse_body(&bytes).map(Valid)
    }
}
