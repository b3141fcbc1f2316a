use crate::session::Role;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Body of `GET /api/auth/me`
///
/// `role` stays a raw string so an unknown role can be reported instead of
/// failing deserialization.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserProfile {
    pub role: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub uid: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct User {
    pub uid: Option<String>,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub status: Option<String>,
    pub last_seen: Option<String>,
}

/// Entry of `GET /api/users/status`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserStatus {
    pub username: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub status: String,
    pub last_seen: Option<String>,
}

impl UserStatus {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// User creation request of the admin dashboard
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Validate)]
pub struct NewUser {
    #[validate(min_length = 1)]
    pub username: String,
    #[validate(pattern = r"^[^@\s]+@[^@\s]+\.[^@\s]+$")]
    pub email: String,
    #[validate(min_length = 1)]
    pub name: String,
    #[validate(min_length = 6)]
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreatedUser {
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

/// Field checked by `GET /api/admin/users/check`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserField {
    Username,
    Email,
}

impl UserField {
    pub fn query_key(self) -> &'static str {
        match self {
            UserField::Username => "username",
            UserField::Email => "email",
        }
    }
}
