pub mod paystack;

pub use paystack::{PaystackConfig, PaystackGateway};
