pub mod core;
pub mod curriculum;
pub mod iep;
pub mod learning_path;
pub mod progress;
pub mod risk;
pub mod roster;
