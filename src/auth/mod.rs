//! Trusted-claims layer.
//!
//! Bearer tokens are verified once by [`require_auth`] before protected routes
//! run. Handlers only see the resulting [`AuthContext`].

pub mod claims;
pub mod middleware;
pub mod verifier;

pub use claims::{authorize_owner, AuthContext, Claims};
pub use middleware::require_auth;
pub use verifier::{AuthError, TokenVerifier};
