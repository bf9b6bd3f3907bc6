//! Account commands

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use mu_api::forms::{AccountDeletion, AvatarUpload, PasswordResetConfirm, ProfileUpdate, Registration, ResetGrant};
use mu_core::{Credentials, StorageScope, Theme, User};

use crate::app::{App, prompt, value_or_prompt};

/// Session-scoped slot holding the grant between `verify` and `confirm`
const RESET_GRANT_KEY: &str = "reset_grant";

pub async fn login(app: &App, email: &str, password: Option<String>, remember: bool) -> Result<()> {
    let password = value_or_prompt(password, "Password")?;
    let session = app
        .session
        .login(&Credentials::new(email.trim(), password), remember)
        .await?;

    match &session.user {
        Some(user) => println!("Signed in as {}", user.display()),
        None => println!("Signed in"),
    }
    if remember {
        println!("Session will be kept after restarts.");
    }
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    app.session.logout().await;
    println!("Signed out.");
    Ok(())
}

pub async fn whoami(app: &App, refresh: bool) -> Result<()> {
    app.require_login()?;
    let user = if refresh {
        app.api.profile().await?
    } else {
        match app.session.current_user() {
            Some(user) => user,
            None => app.api.profile().await?,
        }
    };
    print_user(&user);
    println!("Theme:    {}", app.session.theme(false));
    Ok(())
}

pub async fn register(
    app: &App,
    first_name: &str,
    last_name: &str,
    username: &str,
    email: &str,
    password: Option<String>,
) -> Result<()> {
    let (password, confirm) = match password {
        Some(password) => (password.clone(), password),
        None => (prompt("Password")?, prompt("Repeat password")?),
    };
    let form = Registration::new(first_name, last_name, username, email, &password, &confirm);
    let user = app.api.register(&form).await?;
    println!("Account '{}' created. You can sign in now.", user.username);
    Ok(())
}

pub async fn profile(
    app: &App,
    name: Option<String>,
    theme: Option<Theme>,
    avatar: Option<PathBuf>,
) -> Result<()> {
    app.require_login()?;

    let avatar = match avatar {
        Some(path) => Some(read_avatar(&path).await?),
        None => None,
    };
    let update = ProfileUpdate {
        display_name: name,
        theme,
        avatar,
    };

    let user = if update.is_empty() {
        app.api.profile().await?
    } else {
        let user = app.api.update_profile(&update).await?;
        println!("Profile updated.");
        user
    };
    print_user(&user);
    Ok(())
}

pub async fn reset_request(app: &App, email: &str) -> Result<()> {
    let message = app.api.request_password_reset(email).await?;
    println!("{message}");
    Ok(())
}

pub async fn reset_verify(app: &App, email: &str, code: &str) -> Result<()> {
    let grant = app.api.verify_reset_code(email, code).await?;
    app.session
        .tokens()
        .scope(StorageScope::Session)
        .set(RESET_GRANT_KEY, &serde_json::to_string(&grant)?)?;
    println!("Code accepted. Run `melody-unmix reset-password confirm` to choose a new password.");
    Ok(())
}

pub async fn reset_confirm(app: &App, uid: Option<String>, token: Option<String>) -> Result<()> {
    let store = app.session.tokens().scope(StorageScope::Session);
    let grant = match (uid, token) {
        (Some(uid), Some(token)) => ResetGrant { uid, token },
        _ => {
            let saved = store
                .get(RESET_GRANT_KEY)
                .context("No verified reset code. Run `melody-unmix reset-password verify` first.")?;
            serde_json::from_str(&saved).context("Saved reset grant is unreadable")?
        }
    };

    let new_password = prompt("New password")?;
    let repeat = prompt("Repeat new password")?;
    let message = app
        .api
        .confirm_password_reset(&PasswordResetConfirm::new(&grant, &new_password, &repeat))
        .await?;

    store.remove(RESET_GRANT_KEY)?;
    println!("{message}");
    Ok(())
}

pub async fn verify_send(app: &App, email: &str) -> Result<()> {
    println!("{}", app.api.send_email_verification(email).await?);
    Ok(())
}

pub async fn verify_code(app: &App, email: &str, code: &str) -> Result<()> {
    println!("{}", app.api.verify_email(email, code).await?);
    Ok(())
}

pub async fn delete_account(app: &App, phrase: &str) -> Result<()> {
    app.require_login()?;
    let current = prompt("Current password")?;
    let confirm = prompt("Repeat password")?;
    app.api
        .delete_account(&AccountDeletion::new(&current, &confirm, phrase))
        .await?;
    println!("Account deleted.");
    Ok(())
}

fn print_user(user: &User) {
    println!("Name:     {}", user.display());
    println!("Username: {}", user.username);
    println!("Email:    {}", user.email);
    if let Some(avatar) = &user.avatar {
        println!("Avatar:   {avatar}");
    }
}

async fn read_avatar(path: &std::path::Path) -> Result<AvatarUpload> {
    let mime = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => bail!("Avatar must be a PNG, JPEG, WebP or GIF image"),
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());

    Ok(AvatarUpload {
        file_name,
        mime: Some(mime.to_string()),
        bytes,
    })
}
