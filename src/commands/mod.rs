pub mod cache;
pub mod classify;
pub mod render;
pub mod serve;

// Re-export command functions for convenience
pub use cache::cache_clear;
pub use classify::classify;
pub use render::render;
pub use serve::serve;
