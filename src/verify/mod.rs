//! Email verification — sessions, the state machine, and the workflow that
//! drives mail and provisioning.

pub mod replies;
pub mod session;
pub mod state;
pub mod store;
pub mod validation;
pub mod workflow;

pub use session::{ChatId, VerificationCode, VerificationSession, derive_username};
pub use state::VerificationState;
pub use store::{SessionGuard, SessionStore};
pub use validation::{EmailPolicy, is_valid_email};
pub use workflow::{Replier, Workflow};
