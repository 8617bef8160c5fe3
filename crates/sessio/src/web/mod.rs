//! Session primitives and the request lifecycle

pub mod data;
pub mod id;
pub mod lifecycle;
pub mod session;
pub mod store;
pub mod token;
