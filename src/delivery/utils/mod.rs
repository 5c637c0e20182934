//! Shared file system and HTTP helpers.

pub mod fs;
pub mod http;
