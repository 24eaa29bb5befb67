//! Chat session entity
//!
//! Sessions are keyed by an application-level string identifier, which
//! may be supplied by the client; the store's native row id is never
//! exposed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chat_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    /// Owning user; absent for anonymous sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// Derived from the first message, fixed at creation
    #[sea_orm(column_type = "Text")]
    pub title: String,

    pub created_at: DateTimeWithTimeZone,

    /// Advances monotonically on every message in the session
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether `viewer` may read or delete this session.
    ///
    /// Anonymous sessions are open; owned sessions are visible only to
    /// their owner.
    pub fn accessible_by(&self, viewer: Option<Uuid>) -> bool {
        match self.user_id {
            None => true,
            Some(owner) => viewer == Some(owner),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(user_id: Option<Uuid>) -> Model {
        Model {
            id: "s1".into(),
            user_id,
            title: "Hello".into(),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_anonymous_session_is_open() {
        let s = session(None);
        assert!(s.accessible_by(None));
        assert!(s.accessible_by(Some(Uuid::new_v4())));
    }

    #[test]
    fn test_owned_session_gated_to_owner() {
        let owner = Uuid::new_v4();
        let s = session(Some(owner));
        assert!(s.accessible_by(Some(owner)));
        assert!(!s.accessible_by(Some(Uuid::new_v4())));
        assert!(!s.accessible_by(None));
    }
}
