pub mod bounds;
#[cfg(feature = "api")]
pub mod client;
pub mod config;
pub mod data_collection;
pub mod download;
pub mod error;
pub mod input_data;
pub mod mime_type;
pub mod statistical;
