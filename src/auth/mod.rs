/// Authentication core: token codec, claims, password hashing, and the
/// session manager that orchestrates issuance, rotation, and revocation.

mod claims;
mod codec;
mod password;
mod session;

pub use claims::{Claims, TokenKind};
pub use codec::TokenCodec;
pub use password::hash_password;
pub use password::verify_password;
pub use session::{
    hash_token, CurrentUser, RotatedSession, SessionInfo, SessionManager, SessionTokens,
    SessionView,
};
