pub mod core;
pub mod engine;
pub mod exams;
pub mod reads;
pub mod roster;
pub mod scores;
pub mod tenant;
