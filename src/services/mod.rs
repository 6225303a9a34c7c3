//! Request pipeline stages and the backend they talk to.

pub mod address_resolver;
pub mod authenticator;
pub mod backend;
pub mod body_validator;
pub mod dispatcher;
pub mod sqlite_backend;
