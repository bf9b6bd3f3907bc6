//! Client-side form validation
//!
//! Everything here runs before a request is built; a `ValidationError` never
//! reaches the network.

use mu_core::{FormPart, Theme, ValidationError, ValidationKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$";
pub const MIN_PASSWORD_LEN: usize = 8;
pub const CODE_LEN: usize = 6;
/// Typed by the user to confirm account deletion; the backend checks it too.
pub const DELETE_PHRASE: &str = "eliminar cuenta";

// ═══════════════════════════════════════════════════════════════════════════
// FIELD RULES
// ═══════════════════════════════════════════════════════════════════════════

/// Password rule checklist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PasswordChecks {
    pub length: bool,
    pub uppercase: bool,
    pub digit: bool,
    pub symbol: bool,
}

impl PasswordChecks {
    pub fn evaluate(password: &str) -> Self {
        Self {
            length: password.chars().count() >= MIN_PASSWORD_LEN,
            uppercase: password.chars().any(|c| c.is_ascii_uppercase()),
            digit: password.chars().any(|c| c.is_ascii_digit()),
            symbol: password.chars().any(|c| !c.is_ascii_alphanumeric()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.length && self.uppercase && self.digit && self.symbol
    }

    /// Message for the first rule that fails
    pub fn first_failure(&self) -> Option<&'static str> {
        if !self.length {
            Some("Password must be at least 8 characters long.")
        } else if !self.uppercase {
            Some("Password needs at least one uppercase letter (A-Z).")
        } else if !self.digit {
            Some("Password needs at least one digit (0-9).")
        } else if !self.symbol {
            Some("Password needs at least one special character.")
        } else {
            None
        }
    }
}

pub fn required(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::field(field, format!("The {} field is required.", field.replace('_', " "))));
    }
    Ok(trimmed.to_string())
}

/// Trimmed and lower-cased
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = required("email", email)?;
    let valid = Regex::new(EMAIL_PATTERN)
        .map(|re| re.is_match(&email))
        .unwrap_or(false);
    if !valid {
        return Err(ValidationError::field("email", "Enter a valid email address."));
    }
    Ok(email.to_lowercase())
}

pub fn validate_password(field: &str, password: &str) -> Result<(), ValidationError> {
    match PasswordChecks::evaluate(password).first_failure() {
        Some(message) => Err(ValidationError::field(field, message)),
        None => Ok(()),
    }
}

pub fn validate_confirmation(field: &str, password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password != confirm {
        return Err(ValidationError::field(field, "Passwords do not match."));
    }
    Ok(())
}

/// `x-y-z-a-b-c`, `xyzabc` and `XYZ ABC` all become `XYZABC`.
pub fn normalize_code(code: &str) -> Result<String, ValidationError> {
    let normalized: String = code
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase();

    if normalized.is_empty() {
        return Err(ValidationError::field("code", "Enter the verification code."));
    }
    if normalized.chars().count() != CODE_LEN || !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::field(
            "code",
            "The code has 6 characters (letters and digits).",
        ));
    }
    Ok(normalized)
}

// ═══════════════════════════════════════════════════════════════════════════
// FORMS
// ═══════════════════════════════════════════════════════════════════════════

/// Sign-up form, serialized as the register endpoint expects it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
    pub rol: String,
}

impl Registration {
    pub fn new(
        first_name: &str,
        last_name: &str,
        username: &str,
        email: &str,
        password: &str,
        password2: &str,
    ) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            password2: password2.to_string(),
            rol: "USER".to_string(),
        }
    }

    /// Check every field in form order and return the trimmed copy to send.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        let first_name = required("first_name", &self.first_name)?;
        let last_name = required("last_name", &self.last_name)?;
        let username = required("username", &self.username)?;
        let email = validate_email(&self.email)?;
        validate_password("password", &self.password)?;
        validate_confirmation("password2", &self.password, &self.password2)?;

        Ok(Self {
            first_name,
            last_name,
            username,
            email,
            password: self.password.clone(),
            password2: self.password2.clone(),
            rol: self.rol.clone(),
        })
    }
}

/// Grant returned by the reset-code check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetGrant {
    pub uid: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PasswordResetConfirm {
    pub uid: String,
    pub token: String,
    pub new_password: String,
    pub re_new_password: String,
}

impl PasswordResetConfirm {
    pub fn new(grant: &ResetGrant, new_password: &str, re_new_password: &str) -> Self {
        Self {
            uid: grant.uid.clone(),
            token: grant.token.clone(),
            new_password: new_password.to_string(),
            re_new_password: re_new_password.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        required("uid", &self.uid)?;
        required("token", &self.token)?;
        validate_password("new_password", &self.new_password)?;
        validate_confirmation("re_new_password", &self.new_password, &self.re_new_password)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountDeletion {
    pub current_password: String,
    pub confirm_password: String,
    pub phrase: String,
}

impl AccountDeletion {
    pub fn new(current_password: &str, confirm_password: &str, phrase: &str) -> Self {
        Self {
            current_password: current_password.to_string(),
            confirm_password: confirm_password.to_string(),
            phrase: phrase.to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.current_password.is_empty() {
            return Err(ValidationError::field("current_password", "Enter your current password."));
        }
        validate_confirmation("confirm_password", &self.current_password, &self.confirm_password)?;
        if self.phrase.trim().to_lowercase() != DELETE_PHRASE {
            return Err(ValidationError::field(
                "phrase",
                format!("Type exactly: \"{}\".", DELETE_PHRASE),
            ));
        }
        Ok(())
    }
}

/// New avatar image
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarUpload {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Profile fields to change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub theme: Option<Theme>,
    pub avatar: Option<AvatarUpload>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.theme.is_none() && self.avatar.is_none()
    }

    pub fn to_parts(&self) -> Result<Vec<FormPart>, ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::new(ValidationKind::Empty, "Nothing to update."));
        }

        let mut parts = Vec::new();
        if let Some(name) = &self.display_name {
            parts.push(FormPart::text("name", required("name", name)?));
        }
        if let Some(theme) = self.theme {
            parts.push(FormPart::text("theme", theme.as_str()));
        }
        if let Some(avatar) = &self.avatar {
            if avatar.bytes.is_empty() {
                return Err(ValidationError::field("avatar", "The selected image is empty."));
            }
            parts.push(FormPart::file(
                "avatar",
                &avatar.file_name,
                avatar.mime.clone(),
                avatar.bytes.clone(),
            ));
        }
        Ok(parts)
    }
}
