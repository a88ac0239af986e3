pub mod config;
pub mod document;
pub mod error;
pub mod memory;
pub mod mrc;
pub mod pdf;
pub mod pipeline;
pub mod quality;
pub mod recovery;
