pub mod conversation;
pub mod message;

pub use conversation::{Conversation, MAX_CHAT_NAME_LEN, participants_key};
pub use message::{DeliveryStatus, Message, MessageBody};
