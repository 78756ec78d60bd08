//! Request extractors.

mod identity;
pub use identity::{Authenticator, CurrentUser, HeaderAuthenticator, USER_ID_HEADER};
