//! HTTP request handlers.

pub mod admin;
pub mod cases;
pub mod evidence;
pub mod health;
