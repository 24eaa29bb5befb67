//! Chat message entity
//!
//! Messages are append-only; display order is timestamp ascending. The
//! session id is an application-level reference, not a storage-enforced
//! foreign key.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Message sender role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Ai,
}

impl From<String> for Sender {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ai" => Sender::Ai,
            _ => Sender::User,
        }
    }
}

impl From<Sender> for String {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => "user".to_string(),
            Sender::Ai => "ai".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub session_id: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    /// Exactly "user" or "ai"
    #[sea_orm(column_type = "Text")]
    pub sender: String,

    pub timestamp: DateTimeWithTimeZone,
}

impl Model {
    /// Get the sender as an enum
    pub fn sender(&self) -> Sender {
        Sender::from(self.sender.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_roundtrip() {
        assert_eq!(String::from(Sender::User), "user");
        assert_eq!(String::from(Sender::Ai), "ai");
        assert_eq!(Sender::from("ai".to_string()), Sender::Ai);
        assert_eq!(Sender::from("user".to_string()), Sender::User);
    }
}
