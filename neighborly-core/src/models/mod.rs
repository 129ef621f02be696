//! Domain models with validation at construction
//!
//! All user input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

pub mod email;
pub mod pagination;
pub mod role;
pub mod status;
pub mod text;
pub mod validation;

pub use email::EmailAddress;
pub use pagination::{Paginated, Pagination, PaginationParams};
pub use role::Role;
pub use status::{ComplaintStatus, NotificationKind, ReviewDecision, UserStatus, VerificationStatus};
pub use text::{Body, DisplayName, Title};
pub use validation::ValidationError;
