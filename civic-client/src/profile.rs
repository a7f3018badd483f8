//! Profile editing
//!
//! The display name and avatar live in the auth user's metadata. An avatar
//! is stored once per user in [`AVATAR_BUCKET`] and replaced on every
//! upload; its public URL is then written into the metadata.

use shared::UserInfo;
use shared::client::UserMetadata;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ClientError, ClientResult};
use crate::gateway::Gateway;
use crate::types::SessionContext;

/// Storage bucket for profile pictures
pub const AVATAR_BUCKET: &str = "avatars";

/// Edits the session user's profile
///
/// Each successful update replaces the session user, so later edits start
/// from the stored metadata.
#[derive(Clone)]
pub struct ProfileEditor {
    gateway: Arc<dyn Gateway>,
    session: SessionContext,
}

impl ProfileEditor {
    pub fn new(gateway: Arc<dyn Gateway>, session: SessionContext) -> Self {
        Self { gateway, session }
    }

    /// Session carrying the latest stored user
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Change the display name stamped onto new reports and comments
    pub async fn update_full_name(&mut self, full_name: &str) -> ClientResult<UserInfo> {
        let user = self.session.require_user()?;
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(ClientError::Validation("name cannot be empty".into()));
        }

        let metadata = UserMetadata {
            full_name: Some(full_name.to_string()),
            ..user.user_metadata.clone()
        };
        self.store(metadata).await
    }

    /// Upload a new profile picture and point the profile at it.
    ///
    /// Upload failures are `Call` errors and leave the profile unchanged.
    pub async fn upload_avatar(&mut self, file_name: &str, bytes: Vec<u8>) -> ClientResult<UserInfo> {
        let user = self.session.require_user()?;
        if bytes.is_empty() {
            return Err(ClientError::Validation("avatar image is empty".into()));
        }

        let path = avatar_path(&user.id, file_name);
        let avatar_url = self.gateway.upload(AVATAR_BUCKET, &path, bytes).await?;

        let metadata = UserMetadata {
            avatar_url: Some(avatar_url),
            ..user.user_metadata.clone()
        };
        self.store(metadata).await
    }

    async fn store(&mut self, metadata: UserMetadata) -> ClientResult<UserInfo> {
        let user_id = self.session.require_user()?.id.clone();
        let updated = match self.gateway.update_user(&user_id, &metadata).await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Profile update failed");
                return Err(e);
            }
        };

        tracing::info!(user_id = %user_id, "Profile updated");
        self.session = self.session.clone().with_user(updated.clone());
        Ok(updated)
    }
}

impl std::fmt::Debug for ProfileEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileEditor")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// One object per user: `{user_id}.{ext}`
fn avatar_path(user_id: &str, file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    format!("{}.{}", user_id, ext)
}
