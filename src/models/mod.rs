pub mod assignmentmodel;
pub mod bookingmodel;
pub mod paymentmodel;
pub mod servicemodel;
pub mod subscriptionmodels;
pub mod timeslotmodel;
pub mod usermodel;
