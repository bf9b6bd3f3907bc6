//! Typed endpoint client
//!
//! Every call goes through the session interceptor, so an expired access
//! token is refreshed and the call replayed transparently.

use mu_core::{
    ApiRequest, ApiResponse, AudioUpload, FormPart, HistoryEntry, HistoryPage, JobId,
    StatusReport, Stem, UnmixError, UnmixResult, User, endpoints,
};
use mu_session::SessionManager;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::download::StemDownload;
use crate::forms::{
    AccountDeletion, PasswordResetConfirm, ProfileUpdate, Registration, ResetGrant, normalize_code,
    validate_email,
};

/// Shown for every password-reset request, known address or not
pub const RESET_REQUESTED_MESSAGE: &str =
    "If the address belongs to an account, a verification code is on its way.";

const NO_STEMS_MESSAGE: &str = "no stems are available for this track";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default, alias = "audio_id_postgres")]
    audio_id: Option<JobId>,
}

/// Melody Unmix backend client
#[derive(Clone)]
pub struct ApiClient {
    session: SessionManager,
}

impl ApiClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    async fn call(&self, request: ApiRequest) -> UnmixResult<ApiResponse> {
        self.session.execute(request).await?.into_result()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACCOUNT
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn register(&self, form: &Registration) -> UnmixResult<User> {
        let form = form.validated()?;
        let response = self
            .call(ApiRequest::post(endpoints::REGISTER).json(serde_json::to_value(&form)?))
            .await?;
        log::info!("[Session] Registered account '{}'", form.username);
        response.json()
    }

    /// Always answers with the same acknowledgement, so the response never
    /// reveals whether the address has an account.
    pub async fn request_password_reset(&self, email: &str) -> UnmixResult<String> {
        let email = validate_email(email)?;
        let request = ApiRequest::post(endpoints::PASSWORD_RESET).json(json!({ "email": email }));

        match self.call(request).await {
            Ok(_) | Err(UnmixError::NotFound(_)) => Ok(RESET_REQUESTED_MESSAGE.to_string()),
            Err(e) => Err(e),
        }
    }

    pub async fn verify_reset_code(&self, email: &str, code: &str) -> UnmixResult<ResetGrant> {
        let email = validate_email(email)?;
        let code = normalize_code(code)?;
        let response = self
            .call(
                ApiRequest::post(endpoints::PASSWORD_RESET_VERIFY)
                    .json(json!({ "email": email, "code": code })),
            )
            .await?;
        response.json()
    }

    pub async fn confirm_password_reset(&self, form: &PasswordResetConfirm) -> UnmixResult<String> {
        form.validate()?;
        let response = self
            .call(ApiRequest::post(endpoints::PASSWORD_RESET_CONFIRM).json(serde_json::to_value(form)?))
            .await?;
        Ok(message_of(&response, "Password updated."))
    }

    pub async fn send_email_verification(&self, email: &str) -> UnmixResult<String> {
        let email = validate_email(email)?;
        let response = self
            .call(ApiRequest::post(endpoints::EMAIL_VERIFY_SEND).json(json!({ "email": email })))
            .await?;
        Ok(message_of(&response, "Verification code sent."))
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> UnmixResult<String> {
        let email = validate_email(email)?;
        let code = normalize_code(code)?;
        let response = self
            .call(
                ApiRequest::post(endpoints::EMAIL_VERIFY_VERIFY)
                    .json(json!({ "email": email, "code": code })),
            )
            .await?;
        Ok(message_of(&response, "Email verified."))
    }

    pub async fn profile(&self) -> UnmixResult<User> {
        self.session.fetch_current_user().await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> UnmixResult<User> {
        let parts = update.to_parts()?;
        let response = self
            .call(ApiRequest::patch(endpoints::ME).multipart(parts))
            .await?;

        let mut user: User = response.json()?;
        if let Some(theme) = update.theme {
            user.theme_preference.get_or_insert_with(|| theme.as_str().to_string());
            self.session.themes().save(&user.username, theme)?;
        }
        self.session.update_cached_user(user.clone())?;
        Ok(user)
    }

    /// Delete the account server-side, then end the local session.
    pub async fn delete_account(&self, form: &AccountDeletion) -> UnmixResult<()> {
        form.validate()?;
        self.call(ApiRequest::post(endpoints::DELETE_ACCOUNT).json(serde_json::to_value(form)?))
            .await?;
        log::info!("[Session] Account deleted");
        self.session.logout().await;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // AUDIO
    // ═══════════════════════════════════════════════════════════════════════

    /// Multipart upload; returns the server-assigned id.
    pub async fn upload_audio(&self, upload: &AudioUpload) -> UnmixResult<JobId> {
        let mut parts = vec![FormPart::file(
            "archivo",
            &upload.file_name,
            upload.mime.clone(),
            upload.bytes.clone(),
        )];
        if let Some(duration) = upload.duration_seconds.filter(|d| d.is_finite()) {
            parts.push(FormPart::text("duracion", format!("{}", duration.round() as u64)));
        }
        parts.push(FormPart::text("tamano_mb", format!("{}", upload.size_mb)));

        let response = self.call(ApiRequest::post(endpoints::UPLOAD).multipart(parts)).await?;
        let body: UploadResponse = response.json()?;
        body.audio_id.ok_or_else(|| {
            UnmixError::Serialization("upload response did not include an audio id".into())
        })
    }

    pub async fn job_status(&self, id: &JobId) -> UnmixResult<StatusReport> {
        self.call(ApiRequest::get(endpoints::status(id))).await?.json()
    }

    pub async fn list_jobs(&self) -> UnmixResult<Vec<HistoryEntry>> {
        let page: HistoryPage = self.call(ApiRequest::get(endpoints::MINE)).await?.json()?;
        Ok(page.into_entries())
    }

    pub async fn delete_job(&self, id: &JobId) -> UnmixResult<()> {
        self.call(ApiRequest::delete(endpoints::job(id))).await?;
        log::info!("[Tracker] Deleted job {}", id);
        Ok(())
    }

    /// Fetch one stem, or the whole archive for `Stem::All`.
    pub async fn download_stem(&self, id: &JobId, stem: Stem, title: &str) -> UnmixResult<StemDownload> {
        let response = self.session.execute(ApiRequest::get(endpoints::download(id, stem))).await?;
        if response.status == 404 {
            return Err(UnmixError::NotFound(NO_STEMS_MESSAGE.into()));
        }
        let response = response.into_result()?;
        Ok(StemDownload::from_response(response, title, stem))
    }
}

/// `message` or `detail` from a success body
fn message_of(response: &ApiResponse, fallback: &str) -> String {
    let value: Value = response.json().unwrap_or(Value::Null);
    ["message", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}
