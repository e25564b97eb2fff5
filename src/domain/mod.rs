//! Domain layer: catalog, cart, order and user records, the value objects
//! that guard their invariants, and the storage ports.

pub mod cart;
pub mod order;
pub mod ports;
pub mod product;
pub mod user;
