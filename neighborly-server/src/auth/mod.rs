//! Session authentication and authorization guards
//!
//! Login is passwordless: a short code is emailed, exchanged for a random
//! session token, and the token travels back as an HttpOnly cookie (or a
//! bearer header). Only hashes of codes and tokens are ever stored.
//!
//! Every protected route goes through the same two steps:
//! 1. an extractor resolves the session ([`CurrentUser`], 401 on failure)
//! 2. a guard checks membership and role ([`require_admin`], 403 on failure)

pub mod cookie;
pub mod guards;
pub mod session;
pub mod token;

pub use cookie::{clear_session_cookie, session_cookie, token_from_headers, SESSION_COOKIE};
pub use guards::{require_admin, require_member, require_participant};
pub use session::{CurrentUser, MaybeSession, Session, SessionEmail};
pub use token::{generate_login_code, generate_token, hash_login_code, hash_token};
