pub mod admin;
pub mod analytics;
pub mod payments;
pub mod profile;
