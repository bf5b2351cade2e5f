pub mod dispatcher;
pub mod mastodon;
pub mod sse;
pub mod types;


pub use dispatcher::{DispatcherSettings, MessageDispatcher};
pub use mastodon::{MastodonClient, StreamKind};
