//! CityGuide App — application context and login sessions.

pub mod session;
pub mod state;
pub mod validate;

pub use session::{AuthError, CurrentUser, RegistrationForm, SessionError, SessionService};
pub use state::AppContext;
