pub mod admin;
pub mod bookings;
pub mod slots;
pub mod subscriptions;
pub mod wallet;
pub mod webhooks;
pub mod worker;
