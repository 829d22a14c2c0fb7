//! # Marketplace Token
//!
//! Signed bearer-token codec shared by the identity issuer and the edge
//! gateway.
//!
//! The two components never share runtime state. They agree only on:
//! - the signing secret (configured out-of-band on both sides)
//! - the HMAC algorithm
//! - the claims layout (`sub`, `roles`, `iat`, `exp`)
//!
//! Validity is a pure function of the token bytes, the secret and the clock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod claims;
mod codec;
mod error;
mod secret;

pub use claims::{Claims, IssuedToken, VerifiedToken};
pub use codec::{TokenCodec, bearer_token};
pub use error::TokenError;
pub use jsonwebtoken::Algorithm;
pub use secret::{MIN_SECRET_LEN, SigningSecret};
