pub mod error;
pub mod gateway;
pub mod money;
pub mod providers;
pub mod signature;
pub mod types;
pub mod utils;
