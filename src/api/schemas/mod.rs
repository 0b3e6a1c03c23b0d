pub mod conversation;
pub mod gateway;
pub mod message;

pub use conversation::{
    AddUsersRequest, MarkReadRequest, RenameChatRequest, ResolveConversationRequest, WireConversation,
};
pub use gateway::{AckBody, ClientEvent, ClientFrame, LastOnlineUpdate, PresenceUpdate, ServerEvent, ServerFrame};
pub use message::{OutgoingMessage, WireMessage};
