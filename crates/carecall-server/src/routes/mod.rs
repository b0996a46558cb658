pub mod calls;
pub mod config;
pub mod events;
pub mod queue;
pub mod records;
