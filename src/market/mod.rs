pub mod gateway;
pub mod normalize;
pub mod service;
pub mod single_flight;
pub mod types;
pub mod validate;
