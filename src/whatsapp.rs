//! Customer-facing order message and deep link
//!
//! Rendered at intake and handed off to the messaging collaborator; nothing
//! here is interpreted by this service.

use crate::domain::order::ShippingAddress;

pub struct MessageLine<'a> {
    pub product_name: &'a str,
    pub size: Option<&'a str>,
    pub color: Option<&'a str>,
    pub qty: i32,
    pub line_total: i64,
}

pub fn render_order_message(
    order_number: &str,
    customer_name: &str,
    customer_phone: &str,
    address: &ShippingAddress,
    items: &[MessageLine<'_>],
    total: i64,
    payment_method: &str,
) -> String {
    let items_list = items
        .iter()
        .map(|item| {
            let variant = match (item.size, item.color) {
                (Some(s), Some(c)) => format!(" ({}, {})", s, c),
                (Some(s), None) => format!(" ({})", s),
                (None, Some(c)) => format!(" ({})", c),
                (None, None) => String::new(),
            };
            format!(
                "• {}{} x{} - ₹{}",
                item.product_name, variant, item.qty, item.line_total
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let address_str = if address.is_empty() {
        "Not provided".to_string()
    } else {
        let part = |v: &Option<String>| v.clone().unwrap_or_default();
        format!(
            "{}, {}\n{}, {} - {}",
            part(&address.line1),
            part(&address.line2),
            part(&address.city),
            part(&address.state),
            part(&address.postal_code)
        )
    };

    format!(
        "🛒 *New Order - Loomworks Textiles*\n\n\
         📦 *Order ID:* {order_number}\n\n\
         👤 *Customer:* {customer_name}\n\
         📱 *Phone:* {customer_phone}\n\n\
         📍 *Delivery Address:*\n{address_str}\n\n\
         🛍️ *Items:*\n{items_list}\n\n\
         💰 *Total:* ₹{total}\n\
         💳 *Payment:* {payment_method}\n\n\
         Please confirm this order. 🙏"
    )
}

/// `wa.me` deep link to the store's number with the message prefilled.
pub fn order_deep_link(store_number: &str, message: &str) -> String {
    let digits: String = store_number.chars().filter(|c| c.is_ascii_digit()).collect();
    let destination = if digits.starts_with("91") {
        digits
    } else {
        format!("91{digits}")
    };
    format!("https://wa.me/{}?text={}", destination, urlencode(message))
}

// RFC 3986 unreserved characters pass through; everything else is
// percent-encoded byte-wise.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
