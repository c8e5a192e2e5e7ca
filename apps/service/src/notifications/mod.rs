/// Notification module - turns incident transitions into alerts
///
/// A transition event is produced exactly once per incident open/close;
/// the dispatcher fans it out to every enabled channel through a closed
/// set of adapters (email, webhook, chat webhook).
pub mod dispatcher;
pub mod event;
pub mod senders;

pub use dispatcher::{ChannelAdapter, NotificationDispatcher};
pub use event::{TransitionEvent, TransitionKind};
pub use senders::SenderError;
