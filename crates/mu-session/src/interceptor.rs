//! Request interception: credential attachment and refresh-and-retry

use mu_core::{ApiRequest, ApiResponse, UnmixError, UnmixResult, endpoints};
use serde::Deserialize;
use serde_json::json;

use crate::events::SessionEvent;
use crate::manager::SessionManager;
use crate::refresh::{RefreshFailure, RefreshOutcome};

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

impl SessionManager {
    /// Set the bearer from storage, if there is one.
    pub fn attach_credential(&self, request: &mut ApiRequest) {
        if let Some(token) = self.inner.tokens.access_token() {
            request.bearer = Some(token);
        }
    }

    /// Send through the interceptor.
    ///
    /// Non-2xx answers come back as `Ok`; callers map them with
    /// `ApiResponse::into_result` or inspect the status themselves.
    pub async fn execute(&self, mut request: ApiRequest) -> UnmixResult<ApiResponse> {
        self.attach_credential(&mut request);
        let response = self.inner.transport.send(&request).await?;

        if response.is_unauthorized()
            && !request.retried
            && !endpoints::is_auth_endpoint(&request.path)
        {
            return self.handle_unauthorized(request).await;
        }
        Ok(response)
    }

    /// Wait for a shared refresh, then replay the request once.
    pub async fn handle_unauthorized(&self, mut request: ApiRequest) -> UnmixResult<ApiResponse> {
        let ticket = self.inner.refresh.lock().enqueue();

        if ticket.leader {
            log::debug!("[Refresh] Starting token refresh");
            let session = self.clone();
            tokio::spawn(async move { session.run_refresh().await });
        } else {
            log::debug!("[Refresh] Joining in-flight refresh");
        }

        let token = match ticket.receiver.await {
            Ok(Ok(token)) => token,
            Ok(Err(failure)) => return Err(UnmixError::Auth(failure.reason)),
            Err(_) => return Err(UnmixError::Auth("token refresh was abandoned".into())),
        };

        request.bearer = Some(token);
        request.retried = true;
        self.inner.transport.send(&request).await
    }

    async fn run_refresh(&self) {
        let outcome = self.refresh_access().await;

        match &outcome {
            Ok(_) => {
                log::info!("[Refresh] Access token renewed");
                self.inner.events.emit(SessionEvent::TokenRefreshed);
            }
            Err(failure) => {
                log::warn!("[Refresh] Refresh failed, ending session: {}", failure.reason);
                self.end_session();
            }
        }

        let delivered = self.inner.refresh.lock().settle(outcome);
        log::debug!("[Refresh] Settled {} waiter(s)", delivered);
    }

    /// Raw transport only: no bearer, no interception.
    async fn refresh_access(&self) -> RefreshOutcome {
        let mut request = ApiRequest::post(endpoints::REFRESH);
        if let Some(refresh) = self.inner.tokens.refresh_token() {
            request = request.json(json!({ "refresh": refresh }));
        }

        let response = self
            .inner
            .transport
            .send(&request)
            .await
            .map_err(|e| RefreshFailure::new(e.to_string()))?;

        if !response.is_success() {
            return Err(RefreshFailure::new(format!(
                "session expired ({}): {}",
                response.status,
                response.error_detail().general
            )));
        }

        let body: RefreshResponse = response
            .json()
            .map_err(|e| RefreshFailure::new(e.to_string()))?;
        self.inner
            .tokens
            .replace_access(&body.access)
            .map_err(|e| RefreshFailure::new(e.to_string()))?;
        if let Some(refresh) = &body.refresh {
            self.inner
                .tokens
                .replace_refresh(refresh)
                .map_err(|e| RefreshFailure::new(e.to_string()))?;
        }
        Ok(body.access)
    }
}
