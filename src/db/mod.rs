pub mod assignmentdb;
pub mod bookingdb;
pub mod bufferdb;
pub mod cache;
pub mod configdb;
pub mod db;
pub mod locationdb;
pub mod paymentdb;
pub mod segmentdb;
pub mod servicedb;
pub mod subscriptiondb;
pub mod timeslotdb;
pub mod userdb;
pub mod walletdb;
