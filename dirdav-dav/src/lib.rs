// utils
pub mod error;
pub mod xml;

// webdav
pub mod decoder;
pub mod encoder;
pub mod types;

// final type
pub mod realization;
