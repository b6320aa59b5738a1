//! Pure domain logic: status machine, phone canonicalization, order numbers,
//! lifecycle events.

pub mod events;
pub mod order;
pub mod order_number;
pub mod phone;
