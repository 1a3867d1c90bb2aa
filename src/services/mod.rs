pub mod conversation_service;
pub mod message_service;
pub mod notification_service;
pub mod presence_service;
pub mod typing_service;
pub mod user_directory;
