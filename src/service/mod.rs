//! CrudEngine: generic CRUD over the session abstraction.

mod crud;
mod validation;
pub use crud::CrudEngine;
pub use validation::{EntityInput, RequestValidator};
