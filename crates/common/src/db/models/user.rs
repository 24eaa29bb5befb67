//! User entity for registration and authentication

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub email: String,

    #[sea_orm(column_type = "Text")]
    pub username: String,

    /// Argon2 hash, never the plaintext
    #[sea_orm(column_type = "Text")]
    pub password_hash: String,

    pub is_active: bool,

    /// Login is possible only once the email is verified
    pub is_verified: bool,

    /// Transient OTP, cleared after successful verification or reset
    #[sea_orm(column_type = "Text", nullable)]
    pub otp_code: Option<String>,

    pub otp_issued_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Public view of a user, safe to return from the API
/// (no password hash, no OTP fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTimeWithTimeZone,
}

impl From<Model> for UserResponse {
    fn from(user: Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            is_active: user.is_active,
            is_verified: user.is_verified,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_user_response_omits_secrets() {
        let user = Model {
            id: Uuid::new_v4(),
            email: "user@example.com".into(),
            username: "user".into(),
            password_hash: "$argon2id$...".into(),
            is_active: true,
            is_verified: false,
            otp_code: Some("123456".into()),
            otp_issued_at: Some(Utc::now().into()),
            created_at: Utc::now().into(),
        };

        let response = UserResponse::from(user);
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("otp_code").is_none());
        assert_eq!(json["email"], "user@example.com");
    }
}
