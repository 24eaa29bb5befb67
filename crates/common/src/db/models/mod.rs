//! SeaORM entity models
//!
//! Database entities for the Cortexify backend

mod chat_message;
mod chat_session;
mod status_check;
mod user;

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
    UserResponse,
};

pub use chat_session::{
    Entity as ChatSessionEntity,
    Model as ChatSession,
    ActiveModel as ChatSessionActiveModel,
    Column as ChatSessionColumn,
};

pub use chat_message::{
    Entity as ChatMessageEntity,
    Model as ChatMessage,
    ActiveModel as ChatMessageActiveModel,
    Column as ChatMessageColumn,
    Sender,
};

pub use status_check::{
    Entity as StatusCheckEntity,
    Model as StatusCheck,
    ActiveModel as StatusCheckActiveModel,
    Column as StatusCheckColumn,
};
