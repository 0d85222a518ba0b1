//! Wire entities - the typed objects carried inside dispatch payloads

mod channel;
mod emoji;
mod guild;
mod member;
mod message;
mod role;
mod user;

pub use channel::{Channel, ChannelType};
pub use emoji::Emoji;
pub use guild::{Guild, UnavailableGuild};
pub use member::GuildMember;
pub use message::{Attachment, Message};
pub use role::Role;
pub use user::User;
