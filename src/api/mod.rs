pub mod chat;
pub(crate) mod cors;
pub mod health;
