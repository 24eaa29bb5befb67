//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations with
//! proper error handling. Operations within a request are issued
//! sequentially; only session deletion uses a transaction so that no
//! partial deletion is externally observable.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a new user (unverified, with a pending OTP)
    pub async fn create_user(
        &self,
        email: String,
        username: String,
        password_hash: String,
        otp_code: String,
        otp_issued_at: DateTime<Utc>,
    ) -> Result<User> {
        let now = Utc::now();

        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            username: Set(username),
            password_hash: Set(password_hash),
            is_active: Set(true),
            is_verified: Set(false),
            otp_code: Set(Some(otp_code)),
            otp_issued_at: Set(Some(otp_issued_at.into())),
            created_at: Set(now.into()),
        };

        user.insert(self.conn()).await.map_err(Into::into)
    }

    /// Find user by email
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Email.eq(email))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find user by ID
    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Store a freshly issued OTP on a user
    pub async fn set_user_otp(
        &self,
        user_id: Uuid,
        otp_code: String,
        issued_at: DateTime<Utc>,
    ) -> Result<User> {
        let mut user = self.user_active_model(user_id).await?;
        user.otp_code = Set(Some(otp_code));
        user.otp_issued_at = Set(Some(issued_at.into()));
        user.update(self.conn()).await.map_err(Into::into)
    }

    /// Mark a user verified and clear the OTP fields
    pub async fn mark_user_verified(&self, user_id: Uuid) -> Result<User> {
        let mut user = self.user_active_model(user_id).await?;
        user.is_verified = Set(true);
        user.otp_code = Set(None);
        user.otp_issued_at = Set(None);
        user.update(self.conn()).await.map_err(Into::into)
    }

    /// Replace a user's password hash and clear the OTP fields
    pub async fn update_user_password(&self, user_id: Uuid, password_hash: String) -> Result<User> {
        let mut user = self.user_active_model(user_id).await?;
        user.password_hash = Set(password_hash);
        user.otp_code = Set(None);
        user.otp_issued_at = Set(None);
        user.update(self.conn()).await.map_err(Into::into)
    }

    async fn user_active_model(&self, user_id: Uuid) -> Result<UserActiveModel> {
        Ok(UserEntity::find_by_id(user_id)
            .one(self.conn())
            .await?
            .ok_or(AppError::UserNotFound)?
            .into())
    }

    // ========================================================================
    // Session Operations
    // ========================================================================

    /// Find session by ID
    pub async fn find_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        ChatSessionEntity::find_by_id(session_id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Create a new session
    pub async fn create_session(
        &self,
        session_id: String,
        user_id: Option<Uuid>,
        title: String,
    ) -> Result<ChatSession> {
        let now = Utc::now();

        let session = ChatSessionActiveModel {
            id: Set(session_id),
            user_id: Set(user_id),
            title: Set(title),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        session.insert(self.conn()).await.map_err(Into::into)
    }

    /// Advance a session's `updated_at` to now (title untouched)
    pub async fn touch_session(&self, session_id: &str) -> Result<ChatSession> {
        let mut session: ChatSessionActiveModel = ChatSessionEntity::find_by_id(session_id)
            .one(self.conn())
            .await?
            .ok_or_else(|| AppError::SessionNotFound {
                id: session_id.to_string(),
            })?
            .into();

        session.updated_at = Set(Utc::now().into());
        session.update(self.conn()).await.map_err(Into::into)
    }

    /// List sessions visible to a viewer, most recently updated first.
    ///
    /// Authenticated viewers see only their own sessions; anonymous
    /// viewers see only ownerless sessions.
    pub async fn list_sessions(&self, viewer: Option<Uuid>) -> Result<Vec<ChatSession>> {
        let query = match viewer {
            Some(user_id) => {
                ChatSessionEntity::find().filter(ChatSessionColumn::UserId.eq(user_id))
            }
            None => ChatSessionEntity::find().filter(ChatSessionColumn::UserId.is_null()),
        };

        query
            .order_by_desc(ChatSessionColumn::UpdatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Delete a session and all its messages as one unit.
    ///
    /// Deleting a session that does not exist is a no-op.
    pub async fn delete_session_with_messages(&self, session_id: &str) -> Result<()> {
        let txn = self.conn().begin().await?;

        ChatMessageEntity::delete_many()
            .filter(ChatMessageColumn::SessionId.eq(session_id))
            .exec(&txn)
            .await?;

        ChatSessionEntity::delete_by_id(session_id).exec(&txn).await?;

        txn.commit().await.map_err(Into::into)
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Append a message to a session
    pub async fn insert_message(
        &self,
        session_id: String,
        message: String,
        sender: Sender,
    ) -> Result<ChatMessage> {
        let record = ChatMessageActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session_id),
            message: Set(message),
            sender: Set(String::from(sender)),
            timestamp: Set(Utc::now().into()),
        };

        record.insert(self.conn()).await.map_err(Into::into)
    }

    /// All messages for a session, ordered by timestamp ascending
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        ChatMessageEntity::find()
            .filter(ChatMessageColumn::SessionId.eq(session_id))
            .order_by_asc(ChatMessageColumn::Timestamp)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// The most recent `limit` messages for a session, returned in
    /// timestamp-ascending order for use as conversation context
    pub async fn recent_messages(&self, session_id: &str, limit: u64) -> Result<Vec<ChatMessage>> {
        let mut messages = ChatMessageEntity::find()
            .filter(ChatMessageColumn::SessionId.eq(session_id))
            .order_by_desc(ChatMessageColumn::Timestamp)
            .limit(limit)
            .all(self.conn())
            .await?;

        messages.reverse();
        Ok(messages)
    }

    // ========================================================================
    // Status Check Operations
    // ========================================================================

    /// Record a status check heartbeat
    pub async fn create_status_check(&self, client_name: String) -> Result<StatusCheck> {
        let record = StatusCheckActiveModel {
            id: Set(Uuid::new_v4()),
            client_name: Set(client_name),
            timestamp: Set(Utc::now().into()),
        };

        record.insert(self.conn()).await.map_err(Into::into)
    }

    /// List recorded status checks, most recent first
    pub async fn list_status_checks(&self, limit: u64) -> Result<Vec<StatusCheck>> {
        StatusCheckEntity::find()
            .order_by_desc(StatusCheckColumn::Timestamp)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }
}
