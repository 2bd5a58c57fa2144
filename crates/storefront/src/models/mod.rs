//! Domain models for the storefront.
//!
//! These are validated domain objects, separate from database rows and from
//! the JSON shapes the routes accept.

pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{Cart, CartItem, GuestCart, GuestCartItem};
pub use order::{NewOrder, Order, OrderItem, PaymentReference, ShippingAddress};
pub use product::{NewProduct, Product};
pub use user::{IssuedToken, NewUser, ProfileUpdate, User};
