pub mod auth;
pub mod kg_prices;
pub mod orders;
pub mod product_per_kg;
pub mod products;
pub mod statistics;
