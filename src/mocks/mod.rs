//! In-memory test doubles for every external collaborator.
//!
//! Available behind the `test-utils` feature (on by default) so
//! integration tests and downstream applications can exercise the full
//! login/registration flow without a database, a mail server, or a
//! network.

mod account;
mod avatar;
mod config;
mod notifier;
mod provider;

pub use account::MockAccountStore;
pub use avatar::MockAvatarStore;
pub use config::MockConfigStore;
pub use notifier::{MockAdminNotifier, SentNotification};
pub use provider::MockIdentityProvider;
