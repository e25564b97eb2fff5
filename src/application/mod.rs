//! Application layer containing the business logic orchestration.
//!
//! [`engine::ShopEngine`] keeps stock, carts and orders consistent and is the
//! entry point for everything a logged-in customer does.
//! [`accounts::AccountService`] handles registration and login. Both run each
//! operation as one storage transaction and retry storage conflicts through
//! [`retry::with_retry`].

pub mod accounts;
pub mod engine;
pub mod retry;
