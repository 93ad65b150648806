//! OCR field extraction pipeline for Japanese business documents.
//!
//! The crate is organized around one flow: an image comes in, gets optimized
//! and size-checked, runs through a priority-ordered list of inference
//! backends (local model first when available, remote vision API as the
//! reliable fallback), and the raw text is post-processed into the requested
//! field shape. Results are memoized in a bounded cache keyed by image
//! content and OCR-affecting settings.

pub mod backends;
pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod image;
pub mod models;
pub mod orchestrator;
pub mod postprocess;
pub mod session;
pub mod throttle;
