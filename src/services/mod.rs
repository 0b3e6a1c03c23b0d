pub mod auth;
pub mod conversation_service;
pub mod delivery_service;
pub mod presence_service;
pub mod push;
pub mod rooms;
