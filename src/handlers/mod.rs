pub mod entry_handlers;
pub mod health_handlers;
