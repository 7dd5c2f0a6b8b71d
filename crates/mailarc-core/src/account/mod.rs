//! Mail account management.

mod model;
mod repository;
pub mod validation;

pub use model::{GraphSettings, ImapSettings, MailAccount, MailAccountId, ProviderType};
pub use repository::AccountRepository;
pub use validation::{ValidationError, validate_account};
