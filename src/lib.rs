pub mod api;
pub mod config;
pub mod error;
pub mod gemini;
pub mod generation;
pub mod image_processing;
pub mod pipeline;
pub mod quota;
