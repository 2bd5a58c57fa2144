//! Cart operations on the authoritative per-user cart.

use thiserror::Error;
use tracing::instrument;

use tapntag_core::{CartItemId, PriceError, ProductId, Quantity, QuantityError, UserId};

use crate::db::{CartRepository, ProductRepository, RepositoryError};
use crate::models::Cart;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity below one (or above the cap on update).
    #[error("invalid quantity: {0}")]
    InvalidQuantity(QuantityError),

    /// Adding would push a line past the per-line cap.
    #[error("quantity cannot exceed {max} per item")]
    QuantityLimitExceeded {
        /// Per-line cap.
        max: u32,
    },

    /// Product does not exist.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// User has no cart yet.
    #[error("cart not found")]
    CartNotFound,

    /// Line is not in the user's cart.
    #[error("cart item {0} not found")]
    ItemNotFound(CartItemId),

    /// Totals overflowed.
    #[error("pricing error: {0}")]
    Pricing(#[from] PriceError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Cart service.
pub struct CartService<'a> {
    carts: &'a dyn CartRepository,
    products: &'a dyn ProductRepository,
}

impl<'a> CartService<'a> {
    /// Create a new cart service.
    #[must_use]
    pub const fn new(carts: &'a dyn CartRepository, products: &'a dyn ProductRepository) -> Self {
        Self { carts, products }
    }

    /// The user's cart; empty if they never had one.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart, CartError> {
        Ok(self
            .carts
            .get(user_id)
            .await?
            .unwrap_or_else(|| Cart::empty(user_id)))
    }

    /// Add a product and return the updated cart.
    ///
    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        self.add(user_id, product_id, quantity).await?;
        self.get_cart(user_id).await
    }

    /// Add `quantity` of a product at its current catalog price.
    ///
    /// A product already in the cart has its quantity incremented and keeps
    /// the price captured when it was first added.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for quantities below one,
    /// `CartError::QuantityLimitExceeded` if the line would pass
    /// [`Quantity::MAX`], and `CartError::ProductNotFound` for unknown products.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartItemId, CartError> {
        let quantity = Quantity::try_from(quantity).map_err(|e| match e {
            QuantityError::TooLarge { max } => CartError::QuantityLimitExceeded { max },
            QuantityError::TooSmall => CartError::InvalidQuantity(e),
        })?;

        let product = self
            .products
            .get(product_id)
            .await?
            .ok_or(CartError::ProductNotFound(product_id))?;

        self.carts
            .add_or_increment(user_id, product_id, quantity, product.price)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => CartError::QuantityLimitExceeded {
                    max: Quantity::MAX,
                },
                other => CartError::Repository(other),
            })
    }

    /// Set a line's quantity. The captured unit price does not change.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity`, `CartError::CartNotFound` or
    /// `CartError::ItemNotFound`.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn update_item_quantity(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        let quantity = Quantity::try_from(quantity).map_err(CartError::InvalidQuantity)?;

        let cart = self.carts.get(user_id).await?.ok_or(CartError::CartNotFound)?;
        if cart.line(item_id).is_none()
            || !self.carts.set_quantity(user_id, item_id, quantity).await?
        {
            return Err(CartError::ItemNotFound(item_id));
        }

        self.get_cart(user_id).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` or `CartError::ItemNotFound`.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<Cart, CartError> {
        let cart = self.carts.get(user_id).await?.ok_or(CartError::CartNotFound)?;
        if cart.line(item_id).is_none() || !self.carts.remove_item(user_id, item_id).await? {
            return Err(CartError::ItemNotFound(item_id));
        }

        self.get_cart(user_id).await
    }

    /// Empty the cart. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the store fails.
    pub async fn clear(&self, user_id: UserId) -> Result<Cart, CartError> {
        self.carts.clear(user_id).await?;
        Ok(Cart::empty(user_id))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tapntag_core::Price;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewProduct, Product};

    fn price(amount: i64) -> Price {
        Price::new(Decimal::from(amount)).expect("non-negative")
    }

    async fn product(store: &MemoryStore, amount: i64) -> Product {
        ProductRepository::create(
            store,
            &NewProduct {
                name: "Product X".to_owned(),
                description: None,
                price: price(amount),
                images: Vec::new(),
                features: Vec::new(),
            },
        )
        .await
        .expect("created")
    }

    const USER: UserId = UserId::new(1);

    #[tokio::test]
    async fn test_get_cart_defaults_to_empty() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        let cart = service.get_cart(USER).await.expect("cart");
        assert!(cart.is_empty());
        assert_eq!(cart.user_id, USER);
    }

    #[tokio::test]
    async fn test_add_twice_merges_into_one_line() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        let x = product(&store, 100).await;

        service.add_item(USER, x.id, 2).await.expect("first add");
        let cart = service.add_item(USER, x.id, 3).await.expect("second add");

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items.first().map(|l| l.quantity.get()), Some(5));
        assert_eq!(cart.subtotal(), Ok(price(500)));
    }

    #[tokio::test]
    async fn test_add_update_remove_totals() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        let x = product(&store, 100).await;

        let cart = service.add_item(USER, x.id, 2).await.expect("add");
        assert_eq!(cart.subtotal(), Ok(price(200)));
        let item_id = cart.items.first().map(|l| l.id).expect("line");

        let cart = service
            .update_item_quantity(USER, item_id, 5)
            .await
            .expect("update");
        assert_eq!(cart.subtotal(), Ok(price(500)));

        let cart = service.remove_item(USER, item_id).await.expect("remove");
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), Ok(Price::ZERO));
    }

    #[tokio::test]
    async fn test_price_frozen_until_readded() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        let x = product(&store, 100).await;

        service.add_item(USER, x.id, 1).await.expect("add");
        store.set_product_price(x.id, price(150)).await.expect("reprice");

        let cart = service.add_item(USER, x.id, 1).await.expect("add again");
        let line = cart.items.first().expect("line");
        assert_eq!(line.unit_price, price(100));
        assert_eq!(line.product.price, price(150));
        assert_eq!(cart.subtotal(), Ok(price(200)));

        service.remove_item(USER, line.id).await.expect("remove");
        let cart = service.add_item(USER, x.id, 1).await.expect("re-add");
        assert_eq!(cart.items.first().map(|l| l.unit_price), Some(price(150)));
    }

    #[tokio::test]
    async fn test_add_rejects_bad_quantities() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        let x = product(&store, 100).await;

        assert!(matches!(
            service.add_item(USER, x.id, 0).await,
            Err(CartError::InvalidQuantity(QuantityError::TooSmall))
        ));
        assert!(matches!(
            service.add_item(USER, x.id, -3).await,
            Err(CartError::InvalidQuantity(_))
        ));
        assert!(matches!(
            service.add_item(USER, x.id, 100).await,
            Err(CartError::QuantityLimitExceeded { max: 99 })
        ));
    }

    #[tokio::test]
    async fn test_increment_past_cap_is_rejected() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        let x = product(&store, 1).await;

        service.add_item(USER, x.id, 60).await.expect("add");
        assert!(matches!(
            service.add_item(USER, x.id, 40).await,
            Err(CartError::QuantityLimitExceeded { .. })
        ));
        let cart = service.add_item(USER, x.id, 39).await.expect("exactly at cap");
        assert_eq!(cart.items.first().map(|l| l.quantity.get()), Some(99));
    }

    #[tokio::test]
    async fn test_add_unknown_product() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        assert!(matches!(
            service.add_item(USER, ProductId::new(77), 1).await,
            Err(CartError::ProductNotFound(id)) if id == ProductId::new(77)
        ));
    }

    #[tokio::test]
    async fn test_update_and_remove_missing_targets() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);

        assert!(matches!(
            service.update_item_quantity(USER, CartItemId::new(1), 2).await,
            Err(CartError::CartNotFound)
        ));
        assert!(matches!(
            service.remove_item(USER, CartItemId::new(1)).await,
            Err(CartError::CartNotFound)
        ));

        service.clear(USER).await.expect("creates empty cart");
        assert!(matches!(
            service.update_item_quantity(USER, CartItemId::new(1), 2).await,
            Err(CartError::ItemNotFound(_))
        ));
        assert!(matches!(
            service.remove_item(USER, CartItemId::new(1)).await,
            Err(CartError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_validates_quantity() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        let x = product(&store, 10).await;
        let cart = service.add_item(USER, x.id, 1).await.expect("add");
        let item_id = cart.items.first().map(|l| l.id).expect("line");

        assert!(matches!(
            service.update_item_quantity(USER, item_id, 0).await,
            Err(CartError::InvalidQuantity(_))
        ));
        assert!(matches!(
            service.update_item_quantity(USER, item_id, 1000).await,
            Err(CartError::InvalidQuantity(QuantityError::TooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cannot_touch_another_users_line() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        let x = product(&store, 10).await;
        let cart = service.add_item(USER, x.id, 1).await.expect("add");
        let item_id = cart.items.first().map(|l| l.id).expect("line");

        let intruder = UserId::new(2);
        service.clear(intruder).await.expect("intruder cart");
        assert!(matches!(
            service.remove_item(intruder, item_id).await,
            Err(CartError::ItemNotFound(_))
        ));
        assert_eq!(service.get_cart(USER).await.expect("cart").items.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = MemoryStore::new();
        let service = CartService::new(&store, &store);
        let x = product(&store, 10).await;
        service.add_item(USER, x.id, 3).await.expect("add");

        assert!(service.clear(USER).await.expect("clear").is_empty());
        assert!(service.clear(USER).await.expect("clear again").is_empty());
        assert!(service.get_cart(USER).await.expect("cart").is_empty());
    }
}
