pub mod mailer;
pub mod message;

pub use mailer::{AlertDispatcher, Notifier, SmtpNotifier, SmtpSettings};
pub use message::AlertLimits;
