mod client;

pub use client::{ActivationResult, ApiError, LicenseApiClient};
