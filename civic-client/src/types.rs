//! Session context
//!
//! Resolved once when a session starts and passed explicitly into every
//! component that acts on behalf of the user.

use shared::UserInfo;

use crate::error::{ClientError, ClientResult};

/// Who the client is acting for.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Access token for gateway requests
    access_token: Option<String>,
    /// Current user, `None` for anonymous visitors
    user: Option<UserInfo>,
}

impl SessionContext {
    /// Anonymous session: reads work, mutations fail with `AuthRequired`.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Authenticated session for `user`.
    pub fn authenticated(user: UserInfo, access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            user: Some(user),
        }
    }

    /// Same session, acting for the refreshed `user`.
    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    /// Returns the access token if available.
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Returns the current user if available.
    pub fn user(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Current user, or `AuthRequired` for anonymous sessions.
    pub fn require_user(&self) -> ClientResult<&UserInfo> {
        self.user.as_ref().ok_or(ClientError::AuthRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_session_requires_login() {
        let session = SessionContext::anonymous();
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
        assert!(matches!(session.require_user(), Err(ClientError::AuthRequired)));
    }

    #[test]
    fn authenticated_session_exposes_user() {
        let session = SessionContext::authenticated(UserInfo::new("u1").with_full_name("Asha"), "jwt");
        assert_eq!(session.require_user().unwrap().id, "u1");
        assert_eq!(session.token(), Some("jwt"));
        assert_eq!(session.user().unwrap().display_name(), "Asha");
    }
}
