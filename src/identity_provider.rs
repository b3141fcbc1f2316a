use crate::{config::IdentityConfig, session::Principal};
use anyhow::{Context, Result, bail, ensure};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use log::{debug, info};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;
use std::{
    sync::Mutex,
    time::{Duration, Instant},
};
use tokio::sync::broadcast;
use trait_variant::make;

/// Tokens expiring within this margin are refreshed before use
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);
const NOTIFICATION_CAPACITY: usize = 16;

/// Capability surface of the identity provider consumed by the session controller
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait IdentityProvider {
    /// Sign-in (`Some`) and sign-out (`None`) transitions; drop the receiver to unsubscribe
    fn subscribe(&self) -> broadcast::Receiver<Option<Principal>>;
    /// Principal signed in right now, if any
    fn principal(&self) -> Option<Principal>;
    async fn get_token(&self, principal: &Principal, force_refresh: bool) -> Result<String>;
    async fn sign_out(&self) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    email: Option<String>,
    preferred_username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

struct SignedIn {
    principal: Principal,
    token: String,
    refresh_token: Option<String>,
    expires_at: Option<Instant>,
}

impl SignedIn {
    fn is_fresh(&self) -> bool {
        self.expires_at
            .is_none_or(|at| at.saturating_duration_since(Instant::now()) > EXPIRY_MARGIN)
    }
}

/// OpenID Connect client using the password grant to sign in and the
/// refresh-token grant to renew the identity token
pub struct OidcProvider {
    client: Client,
    config: IdentityConfig,
    signed_in: Mutex<Option<SignedIn>>,
    notifications: broadcast::Sender<Option<Principal>>,
}

impl OidcProvider {
    pub fn new(config: IdentityConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to create identity provider HTTP client")?;
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Ok(Self {
            client,
            config,
            signed_in: Mutex::new(None),
            notifications,
        })
    }

    /// Sign in with e-mail and password and notify subscribers
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal> {
        debug!("sign_in() called for {email}");

        let response = self
            .request_token(&[
                ("grant_type", "password"),
                ("username", email),
                ("password", password),
                ("scope", "openid email"),
            ])
            .await
            .context("failed to sign in")?;

        let signed_in = Self::signed_in_from(response, None, email)?;
        let principal = signed_in.principal.clone();
        *self.lock()? = Some(signed_in);

        info!("signed in as {}", principal.email);
        self.notify(Some(principal.clone()));

        Ok(principal)
    }

    async fn refresh(&self, principal: &Principal) -> Result<String> {
        let refresh_token = {
            let guard = self.lock()?;
            let Some(current) = guard.as_ref().filter(|s| s.principal.id == principal.id) else {
                bail!("failed to refresh token: {} is not signed in", principal.email);
            };
            current
                .refresh_token
                .clone()
                .context("failed to refresh token: no refresh token issued")?
        };

        debug!("refreshing identity token for {}", principal.email);

        let response = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .await
            .context("failed to refresh token")?;

        let signed_in = Self::signed_in_from(response, Some(refresh_token), &principal.email)?;
        let token = signed_in.token.clone();
        *self.lock()? = Some(signed_in);

        Ok(token)
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let res = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .context(format!(
                "failed to send token request to {}",
                self.config.token_url
            ))?;

        let status = res.status();
        let body = res.text().await.context("failed to read response body")?;

        ensure!(
            status.is_success(),
            "token request failed with status {status} and body: {body}"
        );

        serde_json::from_str(&body).context("failed to parse token response")
    }

    fn signed_in_from(
        response: TokenResponse,
        previous_refresh_token: Option<String>,
        fallback_email: &str,
    ) -> Result<SignedIn> {
        let token = response.id_token.unwrap_or(response.access_token);
        let principal = principal_from_token(&token, fallback_email)?;

        Ok(SignedIn {
            principal,
            token,
            refresh_token: response.refresh_token.or(previous_refresh_token),
            expires_at: response
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<SignedIn>>> {
        self.signed_in
            .lock()
            .map_err(|_| anyhow::anyhow!("identity provider state lock poisoned"))
    }

    fn notify(&self, principal: Option<Principal>) {
        if self.notifications.send(principal).is_err() {
            debug!("no subscribers for identity provider notification");
        }
    }
}

impl IdentityProvider for OidcProvider {
    fn subscribe(&self) -> broadcast::Receiver<Option<Principal>> {
        self.notifications.subscribe()
    }

    fn principal(&self) -> Option<Principal> {
        let guard = self.lock().ok()?;
        guard.as_ref().map(|signed_in| signed_in.principal.clone())
    }

    async fn get_token(&self, principal: &Principal, force_refresh: bool) -> Result<String> {
        if !force_refresh {
            let guard = self.lock()?;
            match guard.as_ref() {
                Some(current) if current.principal.id != principal.id => {
                    bail!("failed to get token: {} is not signed in", principal.email)
                }
                Some(current) if current.is_fresh() => return Ok(current.token.clone()),
                Some(_) => {}
                None => bail!("failed to get token: no principal signed in"),
            }
        }

        self.refresh(principal).await
    }

    async fn sign_out(&self) -> Result<()> {
        let previous = self.lock()?.take();

        if let Some(previous) = previous {
            info!("signed out {}", previous.principal.email);
            self.notify(None);
        }

        Ok(())
    }
}

/// Derive the principal from the claims of an identity token
///
/// The signature is not checked here; the backend verifies every token it
/// receives.
pub fn principal_from_token(token: &str, fallback_email: &str) -> Result<Principal> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let claims = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .context("failed to decode identity token claims")?
        .claims;

    let email = claims
        .email
        .or(claims.preferred_username)
        .unwrap_or_else(|| fallback_email.to_string());

    Ok(Principal {
        id: claims.sub,
        email,
    })
}
