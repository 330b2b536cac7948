//! Signed-in user context.
//!
//! A [`Session`] is created at sign-in (or restored from a token the front end kept) and
//! dropped at sign-out. It is passed explicitly to every backend call.

use crate::api::lenient;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_id")]
    pub school_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub school_name: Option<String>,
}

#[derive(Clone, PartialEq)]
pub struct Session {
    token: String,
    token_type: String,
    pub user: UserInfo,
}

// Keeps the bearer token out of logs and debug dumps.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token_type", &self.token_type)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(token: impl Into<String>, token_type: impl Into<String>, user: UserInfo) -> Self {
        Self {
            token: token.into(),
            token_type: token_type.into(),
            user,
        }
    }

    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn school_id(&self) -> Option<i64> {
        self.user.school_id
    }

    pub fn school_name(&self) -> Option<&str> {
        self.user
            .school_name
            .as_deref()
            .filter(|s| !s.is_empty() && *s != "-")
    }

    /// Public view sent to the front end; never includes the token.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "tokenType": self.token_type,
            "userId": self.user.id,
            "username": self.user.username,
            "fullName": self.user.full_name,
            "email": self.user.email,
            "role": self.user.role,
            "schoolId": self.user.school_id,
            "schoolName": self.school_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_token() {
        let s = Session::new("secret-token", "bearer", UserInfo::default());
        assert!(!format!("{s:?}").contains("secret-token"));
        assert_eq!(s.authorization_header(), "Bearer secret-token");
        assert!(s.describe().get("token").is_none());
    }

    #[test]
    fn placeholder_school_name_is_hidden() {
        let user: UserInfo = serde_json::from_value(serde_json::json!({
            "id": 4, "role": "teacher", "school_id": "12", "school_name": "-"
        }))
        .expect("user");
        let s = Session::new("t", "bearer", user);
        assert_eq!(s.school_id(), Some(12));
        assert_eq!(s.school_name(), None);
    }
}
