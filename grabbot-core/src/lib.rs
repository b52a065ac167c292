// src/lib.rs

pub mod repositories;
pub mod platforms;
pub mod http;
pub mod eventbus;
pub mod cache;
pub mod services;
pub mod utils;
pub mod test_utils;

pub use grabbot_common::error::Error;
pub use http::{DefaultHttpClient, HttpClient};
