//! Bearer-token identity issued by the identity provider.

mod jwt;

pub use jwt::{identity_from_headers, AuthError, Identity, JwtAuth};
