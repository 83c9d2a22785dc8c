pub mod files;
pub mod health;
pub mod sign;
pub mod upload;
