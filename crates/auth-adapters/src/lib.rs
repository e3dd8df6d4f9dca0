//! Identity adapters implementing `domains::ports::IdentityVerifier`.

#[cfg(feature = "auth-jwt")]
pub mod jwt;

#[cfg(feature = "auth-jwt")]
pub use jwt::JwtIdentity;
