pub mod graph;
pub mod paper;
pub mod raw;

pub use graph::*;
pub use paper::*;
pub use raw::*;
