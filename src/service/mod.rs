pub mod admin_config;
pub mod assignment_service;
pub mod background_jobs;
pub mod booking_service;
pub mod buffer_service;
pub mod error;
pub mod location_service;
pub mod payment_gateway;
pub mod segment_service;
pub mod subscription_service;
pub mod timeslot_service;
pub mod wallet_service;
#[cfg(test)]
mod fixtures;
