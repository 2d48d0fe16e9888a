/// Authentication primitives: signed access tokens, opaque refresh tokens,
/// and password hashing. Orchestration lives in `crate::session`.

mod claims;
mod jwt;
mod opaque;
mod password;

pub use claims::Claims;
pub use jwt::AccessTokenCodec;
pub use opaque::OpaqueTokenGenerator;
pub use password::{check_max_length, PasswordHasher, MAX_PASSWORD_BYTES, MIN_PASSWORD_CHARS};
