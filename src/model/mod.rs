pub mod queries;
pub mod user;
