pub mod api;

pub use api::{AdminNotifier, RedemptionApi};
