//! Order domain types.
//!
//! An order copies everything it needs from the cart at checkout. Nothing here
//! points back at the cart, so later cart edits cannot change a placed order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tapntag_core::{OrderId, OrderStatus, PhoneNumber, Price, ProductId, Quantity, UserId};

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Price,
    pub shipping_address: ShippingAddress,
    #[serde(flatten)]
    pub payment: PaymentReference,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// An order to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Price,
    pub shipping_address: ShippingAddress,
    pub payment: PaymentReference,
    pub status: OrderStatus,
}

/// A line copied from the cart at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// `None` once the product has been removed from the catalog.
    pub product_id: Option<ProductId>,
    /// Product name at checkout.
    pub product_name: String,
    pub quantity: Quantity,
    pub unit_price: Price,
}

/// The gateway's identifiers for the payment that paid for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReference {
    #[serde(rename = "orderId")]
    pub gateway_order_id: String,
    #[serde(rename = "paymentId")]
    pub gateway_payment_id: String,
}

/// Delivery address captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pin_code: String,
    pub phone: String,
}

impl ShippingAddress {
    /// Length of an Indian postal PIN code.
    pub const PIN_CODE_DIGITS: usize = 6;

    /// Check that every required field is present and well-formed.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("shipping address {field} is required"));
            }
        }

        let pin = self.pin_code.trim();
        if pin.len() != Self::PIN_CODE_DIGITS || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!(
                "shipping address pinCode must be {} digits",
                Self::PIN_CODE_DIGITS
            ));
        }

        PhoneNumber::parse(self.phone.trim())
            .map_err(|e| format!("shipping address phone: {e}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            first_name: "Asha".to_owned(),
            last_name: "Rao".to_owned(),
            company: None,
            address: "12 MG Road".to_owned(),
            city: "Bengaluru".to_owned(),
            state: "Karnataka".to_owned(),
            pin_code: "560001".to_owned(),
            phone: "9876543210".to_owned(),
        }
    }

    #[test]
    fn test_valid_address_passes() {
        assert_eq!(address().validate(), Ok(()));
    }

    #[test]
    fn test_blank_required_field_is_rejected() {
        let mut addr = address();
        addr.city = "  ".to_owned();
        let err = addr.validate().expect_err("blank city");
        assert!(err.contains("city"), "{err}");
    }

    #[test]
    fn test_pin_code_must_be_six_digits() {
        let mut addr = address();
        addr.pin_code = "5600".to_owned();
        assert!(addr.validate().is_err());
        addr.pin_code = "56000A".to_owned();
        assert!(addr.validate().is_err());
    }

    #[test]
    fn test_phone_must_be_ten_digits() {
        let mut addr = address();
        addr.phone = "+91 98765".to_owned();
        assert!(addr.validate().is_err());
    }

    #[test]
    fn test_deserializes_checkout_form() {
        let json = r#"{
            "firstName": "Asha", "lastName": "Rao", "company": "",
            "address": "12 MG Road", "city": "Bengaluru", "state": "Karnataka",
            "pinCode": "560001", "phone": "9876543210"
        }"#;
        let addr: ShippingAddress = serde_json::from_str(json).expect("valid form");
        assert_eq!(addr.pin_code, "560001");
        assert_eq!(addr.company.as_deref(), Some(""));
    }

    #[test]
    fn test_payment_reference_uses_gateway_field_names() {
        let reference = PaymentReference {
            gateway_order_id: "order_1".to_owned(),
            gateway_payment_id: "pay_1".to_owned(),
        };
        let json = serde_json::to_value(&reference).expect("serializable");
        assert_eq!(json["orderId"], "order_1");
        assert_eq!(json["paymentId"], "pay_1");
    }
}
