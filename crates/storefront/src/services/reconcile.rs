//! Merging a guest cart into a user's cart at sign-in.
//!
//! Each guest line is replayed through [`CartService::add`] with the product
//! id and quantity only, so the catalog price at merge time is what the user
//! is charged. One bad line does not stop the rest and lines that merged stay
//! merged. The guest cart is emptied whatever happens.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use tapntag_core::{ProductId, UserId};

use super::cart::{CartError, CartService};
use crate::db::{CartRepository, ProductRepository};
use crate::models::{Cart, GuestCart, GuestCartItem};

/// A guest line that could not be merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileFailure {
    /// Absent when the line carried no usable product id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    /// Name from the guest snapshot, if the client kept one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub reason: String,
}

/// Outcome of a merge.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// The user's cart after merging.
    pub cart: Cart,
    /// Number of guest lines merged.
    pub merged: usize,
    pub failures: Vec<ReconcileFailure>,
}

/// Merges guest carts into persisted carts.
pub struct GuestCartReconciler<'a> {
    cart: CartService<'a>,
}

impl<'a> GuestCartReconciler<'a> {
    /// Create a new reconciler.
    #[must_use]
    pub const fn new(carts: &'a dyn CartRepository, products: &'a dyn ProductRepository) -> Self {
        Self {
            cart: CartService::new(carts, products),
        }
    }

    /// Merge `guest` into `user_id`'s cart, leaving `guest` empty.
    ///
    /// # Errors
    ///
    /// Per-line failures are reported in the result. Only a failure to read
    /// the merged cart back is returned as an error.
    #[instrument(skip(self, guest), fields(user_id = %user_id, lines = guest.items.len()))]
    pub async fn reconcile(
        &self,
        user_id: UserId,
        guest: &mut GuestCart,
    ) -> Result<ReconcileReport, CartError> {
        let mut merged = 0;
        let mut failures = Vec::new();

        for line in guest.drain() {
            let raw_name = line.get("name").and_then(Value::as_str).map(str::to_owned);
            let item = match GuestCartItem::from_line(line) {
                Ok(item) => item,
                Err(e) => {
                    warn!(error = %e, "malformed guest cart line");
                    failures.push(ReconcileFailure {
                        product_id: None,
                        name: raw_name,
                        reason: "malformed line".to_owned(),
                    });
                    continue;
                }
            };

            match self.cart.add(user_id, item.product_id, item.quantity).await {
                Ok(_) => merged += 1,
                Err(e) => {
                    warn!(product_id = %item.product_id, error = %e, "guest cart line not merged");
                    failures.push(ReconcileFailure {
                        product_id: Some(item.product_id),
                        name: item.snapshot_name().map(str::to_owned),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(merged, failed = failures.len(), "guest cart reconciled");

        Ok(ReconcileReport {
            cart: self.cart.get_cart(user_id).await?,
            merged,
            failures,
        })
    }
}
