#![forbid(unsafe_code)]

pub mod graph;
pub mod model;
pub mod time;

pub use time::Clock;
