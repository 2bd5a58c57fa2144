//! In-process implementation of every repository trait.
//!
//! Mirrors the constraints the `PostgreSQL` schema enforces (unique phone and
//! email, one line per product, the per-line quantity cap, one order per
//! gateway payment id) so tests exercise the same failure paths.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use tapntag_core::{
    CartItemId, Email, OrderId, PhoneNumber, Price, ProductId, Quantity, UserId,
};

use super::{CartRepository, OrderRepository, ProductRepository, RepositoryError, UserRepository};
use crate::models::{
    Cart, CartItem, IssuedToken, NewOrder, NewProduct, NewUser, Order, Product, ProfileUpdate,
    User,
};

#[derive(Debug, Clone)]
struct TokenRecord {
    user_id: UserId,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

#[derive(Debug, Clone)]
struct StoredLine {
    id: CartItemId,
    product_id: ProductId,
    quantity: Quantity,
    unit_price: Price,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i32,
    users: BTreeMap<UserId, User>,
    tokens: HashMap<Uuid, TokenRecord>,
    products: BTreeMap<ProductId, Product>,
    carts: HashMap<UserId, Vec<StoredLine>>,
    orders: Vec<Order>,
}

impl Inner {
    const fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn expand_cart(&self, user_id: UserId, lines: &[StoredLine]) -> Cart {
        let items = lines
            .iter()
            .filter_map(|line| {
                self.products.get(&line.product_id).map(|product| CartItem {
                    id: line.id,
                    product: product.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
            })
            .collect();
        Cart { user_id, items }
    }
}

/// A repository store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change a product's catalog price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn set_product_price(
        &self,
        id: ProductId,
        price: Price,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        let product = inner.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        product.price = price;
        Ok(())
    }

    /// Delete a product, dropping it from every cart.
    pub async fn delete_product(&self, id: ProductId) {
        let mut inner = self.inner.lock().await;
        inner.products.remove(&id);
        for lines in inner.carts.values_mut() {
            lines.retain(|line| line.product_id != id);
        }
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn get_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().find(|u| &u.phone_number == phone).cloned())
    }

    async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.users.values().find(|u| &u.email == email).cloned())
    }

    async fn create(&self, new_user: &NewUser) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner
            .users
            .values()
            .any(|u| u.phone_number == new_user.phone_number)
        {
            return Err(RepositoryError::Conflict(
                "phone number already exists".to_owned(),
            ));
        }
        if inner.users.values().any(|u| u.email == new_user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let user = User {
            id: UserId::new(inner.next_id()),
            phone_number: new_user.phone_number.clone(),
            email: new_user.email.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            created_at: Utc::now(),
        };
        inner.users.insert(user.id, user.clone());
        inner.carts.insert(user.id, Vec::new());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if let Some(email) = &update.email
            && inner.users.values().any(|u| u.id != id && &u.email == email)
        {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let user = inner.users.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if let Some(first_name) = &update.first_name {
            user.first_name.clone_from(first_name);
        }
        if let Some(last_name) = &update.last_name {
            user.last_name.clone_from(last_name);
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        Ok(user.clone())
    }

    async fn record_token(&self, token: &IssuedToken) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.tokens.contains_key(&token.jti) {
            return Err(RepositoryError::Conflict("token id already exists".to_owned()));
        }
        inner.tokens.insert(
            token.jti,
            TokenRecord {
                user_id: token.user_id,
                expires_at: token.expires_at,
                revoked: false,
            },
        );
        Ok(())
    }

    async fn is_token_active(
        &self,
        user_id: UserId,
        jti: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tokens
            .get(&jti)
            .is_some_and(|t| t.user_id == user_id && !t.revoked && t.expires_at > now))
    }

    async fn revoke_token(&self, user_id: UserId, jti: Uuid) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().await;
        match inner.tokens.get_mut(&jti) {
            Some(record) if record.user_id == user_id && !record.revoked => {
                record.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.inner.lock().await.products.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        Ok(self.inner.lock().await.products.values().cloned().collect())
    }

    async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let created = Product {
            id: ProductId::new(inner.next_id()),
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price,
            images: product.images.clone(),
            features: product.features.clone(),
            created_at: Utc::now(),
        };
        inner.products.insert(created.id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn get(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .carts
            .get(&user_id)
            .map(|lines| inner.expand_cart(user_id, lines)))
    }

    async fn add_or_increment(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: Quantity,
        unit_price: Price,
    ) -> Result<CartItemId, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let new_id = CartItemId::new(inner.next_id());
        let lines = inner.carts.entry(user_id).or_default();

        if let Some(line) = lines.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = line.quantity.checked_add(quantity).map_err(|_| {
                RepositoryError::Conflict(format!(
                    "cart line for product {product_id} would exceed {} units",
                    Quantity::MAX
                ))
            })?;
            return Ok(line.id);
        }

        lines.push(StoredLine {
            id: new_id,
            product_id,
            quantity,
            unit_price,
        });
        Ok(new_id)
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: Quantity,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let line = inner
            .carts
            .get_mut(&user_id)
            .and_then(|lines| lines.iter_mut().find(|l| l.id == item_id));
        match line {
            Some(line) => {
                line.quantity = quantity;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let Some(lines) = inner.carts.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = lines.len();
        lines.retain(|l| l.id != item_id);
        Ok(lines.len() < before)
    }

    async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.inner
            .lock()
            .await
            .carts
            .entry(user_id)
            .or_default()
            .clear();
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner
            .orders
            .iter()
            .any(|o| o.payment.gateway_payment_id == order.payment.gateway_payment_id)
        {
            return Err(RepositoryError::Conflict(
                "payment already used for an order".to_owned(),
            ));
        }

        let created = Order {
            id: OrderId::new(inner.next_id()),
            user_id: order.user_id,
            items: order.items.clone(),
            total_amount: order.total_amount,
            shipping_address: order.shipping_address.clone(),
            payment: order.payment.clone(),
            status: order.status,
            created_at: Utc::now(),
        };
        inner.orders.push(created.clone());
        Ok(created)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}
