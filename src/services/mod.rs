pub mod analysis;
pub mod export;
pub mod scheduler;
pub mod store;
