// Background workers for the chunk pipeline
pub mod thread_pool;

pub use thread_pool::*;
