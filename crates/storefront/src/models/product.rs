//! Catalog product types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tapntag_core::{Price, ProductId};

/// A product in the catalog.
///
/// `price` is the current catalog price. Cart lines keep their own copy taken
/// when the product was first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub images: Vec<String>,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A product to insert into the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
}
