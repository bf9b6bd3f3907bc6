//! Backend routes, relative to `ClientConfig::api_base`

use crate::model::{JobId, Stem};

pub const LOGIN: &str = "/api/users/auth/login-email/";
pub const REFRESH: &str = "/api/users/auth/refresh/";
pub const LOGOUT: &str = "/api/users/auth/logout/";
pub const REGISTER: &str = "/api/users/auth/register/";
pub const PASSWORD_RESET: &str = "/api/users/auth/password-reset/";
pub const PASSWORD_RESET_VERIFY: &str = "/api/users/auth/password-reset/verify/";
pub const PASSWORD_RESET_CONFIRM: &str = "/api/users/auth/password-reset/confirm/";
pub const EMAIL_VERIFY_SEND: &str = "/api/users/auth/email-verify/send/";
pub const EMAIL_VERIFY_VERIFY: &str = "/api/users/auth/email-verify/verify/";
pub const ME: &str = "/api/users/me/";
pub const DELETE_ACCOUNT: &str = "/api/users/delete-account/";
pub const UPLOAD: &str = "/api/audios/upload/";
pub const MINE: &str = "/api/audios/mine/";

pub fn status(id: &JobId) -> String {
    format!("/api/audios/{}/status", id)
}

pub fn download(id: &JobId, stem: Stem) -> String {
    format!("/api/audios/{}/download/{}", id, stem.as_str())
}

pub fn job(id: &JobId) -> String {
    format!("/api/audios/{}/", id)
}

/// Login, refresh and logout never go through refresh-and-retry.
pub fn is_auth_endpoint(path: &str) -> bool {
    path.contains("/auth/login") || path.contains("/auth/refresh") || path.contains("/auth/logout")
}
