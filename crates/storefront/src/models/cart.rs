//! Cart types: the persisted per-user cart and the client-held guest cart.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tapntag_core::{CartItemId, Price, PriceError, ProductId, Quantity, UserId};

use super::product::Product;

/// A user's persisted cart with product details joined in.
///
/// A user who never added anything has an empty cart, not a missing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    pub user_id: UserId,
    pub items: Vec<CartItem>,
}

impl Cart {
    /// An empty cart for `user_id`.
    #[must_use]
    pub const fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
        }
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity.get()).sum()
    }

    /// The line holding `product_id`, if any.
    #[must_use]
    pub fn line_for_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product.id == product_id)
    }

    /// The line with id `item_id`, if any.
    #[must_use]
    pub fn line(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Sum of `unit_price * quantity` over all lines.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the total does not fit a decimal.
    pub fn subtotal(&self) -> Result<Price, PriceError> {
        self.items
            .iter()
            .try_fold(Price::ZERO, |acc, item| acc.checked_add(item.line_total()?))
    }
}

/// One product line in a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub id: CartItemId,
    /// The product as it is in the catalog now.
    pub product: Product,
    pub quantity: Quantity,
    /// Price captured when the product was first added to this cart.
    pub unit_price: Price,
}

impl CartItem {
    /// `unit_price * quantity`.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the product does not fit a decimal.
    pub fn line_total(&self) -> Result<Price, PriceError> {
        self.unit_price.line_total(self.quantity)
    }
}

/// Cart kept by an anonymous shopper on their own device.
///
/// Only the product id and quantity are trusted. Anything else the client
/// stored (name, price, images) is carried along for error reporting and
/// otherwise ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestCart {
    /// Raw client lines. Each is parsed on its own when merged, so one
    /// malformed line cannot reject the rest.
    #[serde(default)]
    pub items: Vec<Value>,
}

impl GuestCart {
    /// Whether the guest cart holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove and return every item, leaving the guest cart empty.
    pub fn drain(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.items)
    }
}

/// A guest cart line as the client stored it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestCartItem {
    #[serde(rename = "_id", alias = "productId")]
    pub product_id: ProductId,
    /// Unvalidated; checked against the cart rules during reconciliation.
    pub quantity: i64,
    /// The rest of the client's product snapshot.
    #[serde(flatten)]
    pub snapshot: Map<String, Value>,
}

impl GuestCartItem {
    /// Parse one raw guest line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line has no integer product id or quantity.
    pub fn from_line(line: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(line)
    }

    /// Product name from the client snapshot, if it kept one.
    #[must_use]
    pub fn snapshot_name(&self) -> Option<&str> {
        self.snapshot.get("name").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;

    fn product(id: i32, price: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Card {id}"),
            description: None,
            price: Price::new(Decimal::from(price)).expect("non-negative"),
            images: Vec::new(),
            features: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn line(id: i32, product: Product, quantity: u32, unit_price: i64) -> CartItem {
        CartItem {
            id: CartItemId::new(id),
            product,
            quantity: Quantity::new(quantity).expect("valid quantity"),
            unit_price: Price::new(Decimal::from(unit_price)).expect("non-negative"),
        }
    }

    #[test]
    fn test_subtotal_uses_captured_unit_price() {
        // Catalog price moved to 150 after the line was added at 100
        let cart = Cart {
            user_id: UserId::new(1),
            items: vec![
                line(1, product(1, 150), 2, 100),
                line(2, product(2, 50), 1, 50),
            ],
        };
        assert_eq!(
            cart.subtotal().map(|p| p.amount()),
            Ok(Decimal::from(250))
        );
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_empty_cart_totals_zero() {
        let cart = Cart::empty(UserId::new(1));
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), Ok(Price::ZERO));
        assert_eq!(cart.item_count(), 0);
    }

    #[test]
    fn test_line_lookups() {
        let cart = Cart {
            user_id: UserId::new(1),
            items: vec![line(7, product(3, 10), 1, 10)],
        };
        assert!(cart.line_for_product(ProductId::new(3)).is_some());
        assert!(cart.line_for_product(ProductId::new(4)).is_none());
        assert!(cart.line(CartItemId::new(7)).is_some());
    }

    #[test]
    fn test_guest_item_accepts_browser_snapshot() {
        let json = r#"{"items":[{"_id":5,"name":"Metal Card","price":"₹999","quantity":2}]}"#;
        let mut guest: GuestCart = serde_json::from_str(json).expect("valid guest cart");
        let line = guest.drain().pop().expect("one item");
        let item = GuestCartItem::from_line(line).expect("well-formed line");
        assert_eq!(item.product_id, ProductId::new(5));
        assert_eq!(item.quantity, 2);
        assert_eq!(item.snapshot_name(), Some("Metal Card"));
    }

    #[test]
    fn test_guest_item_accepts_product_id_alias() {
        let json = r#"{"items":[{"productId":9,"quantity":1}]}"#;
        let mut guest: GuestCart = serde_json::from_str(json).expect("valid guest cart");
        let line = guest.drain().pop().expect("one item");
        let item = GuestCartItem::from_line(line).expect("well-formed line");
        assert_eq!(item.product_id, ProductId::new(9));
    }

    #[test]
    fn test_guest_cart_keeps_malformed_lines_for_later() {
        let json = r#"{"items":[{"_id":"64f1c2a9e4b0a1b2c3d4e5f6","quantity":1},{"_id":3}]}"#;
        let mut guest: GuestCart = serde_json::from_str(json).expect("lines parsed lazily");
        let lines = guest.drain();
        assert_eq!(lines.len(), 2);
        assert!(
            lines
                .into_iter()
                .all(|line| GuestCartItem::from_line(line).is_err())
        );
    }

    #[test]
    fn test_drain_empties_guest_cart() {
        let mut guest: GuestCart =
            serde_json::from_str(r#"{"items":[{"_id":1,"quantity":1}]}"#).expect("valid");
        assert_eq!(guest.drain().len(), 1);
        assert!(guest.is_empty());
    }
}
