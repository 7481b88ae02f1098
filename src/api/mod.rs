pub mod client;
pub mod pages;

pub use client::ApiClient;
pub use pages::{build_dashboard, Endpoint};
