pub mod api;
pub mod job;
pub mod metadata;
pub mod preview;
pub mod stats;
