pub mod admin;
pub mod retry;
pub mod webhook;
