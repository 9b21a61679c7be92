//! Authentication and authorization core.
//!
//! Flow Overview: the [`gate`] middleware verifies the bearer token on every
//! non-public request and attaches an [`Identity`]; handlers call into the
//! [`Authenticator`] for credential checks, MFA and account lifecycle, and
//! [`require_roles`] narrows individual routes to a [`RoleSet`].

pub mod authenticator;
pub mod error;
pub mod gate;
pub mod mfa;
pub mod password;
pub mod revocation;
pub mod role;
pub mod state;
pub mod token;
pub(crate) mod utils;

pub use authenticator::{Authenticator, LoginOutcome, MfaSetup, Registration, Session};
pub use error::{AuthError, FieldError};
pub use gate::{check_roles, gate, require_roles, Identity};
pub use revocation::RevocationRegistry;
pub use role::{Role, RoleSet};
pub use state::{AuthConfig, AuthState};
pub use token::{Claims, Subject, TokenCodec, TokenError};
