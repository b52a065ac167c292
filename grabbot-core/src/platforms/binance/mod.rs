pub mod client;

pub use client::{classify, BinancePayClient};
