pub mod equipment;
pub mod metadata;
pub mod plan;
