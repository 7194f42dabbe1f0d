mod rest;

pub use rest::{create_metrics_api, create_rest_api};
