//! Session state: who is signed in and whether they are an administrator.
//!
//! [`AuthContext`] is built once at startup around an [`IdentityProvider`] and
//! handed to whatever needs the current user. It moves from `Unknown` to
//! `Anonymous` or `Authenticated` as the provider reports changes and is torn
//! down with [`AuthContext::shutdown`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::TokenVerifier;
use crate::errors::AppError;
use crate::nav::Navigation;

/// A signed-in account as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub hosted_domain: Option<String>,
    /// `admin` claim on the identity token
    pub admin_claim: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

/// Admin if the email is the reserved one, otherwise if the token says so.
pub fn derive_role(identity: &Identity, privileged_email: &str) -> Role {
    if identity.email == privileged_email || identity.admin_claim {
        Role::Admin
    } else {
        Role::Member
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// No provider callback yet
    Unknown,
    Anonymous,
    Authenticated { identity: Identity, role: Role },
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Unknown)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthState::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            AuthState::Authenticated {
                role: Role::Admin,
                ..
            }
        )
    }

    /// The signed-in identity, or `Unauthorized`.
    pub fn require_user(&self) -> Result<&Identity, AppError> {
        self.identity()
            .ok_or_else(|| AppError::Unauthorized("Sign in required".to_string()))
    }

    /// The signed-in administrator, or `Unauthorized`/`PermissionDenied`.
    pub fn require_admin(&self) -> Result<&Identity, AppError> {
        let identity = self.require_user()?;
        if self.is_admin() {
            Ok(identity)
        } else {
            Err(AppError::PermissionDenied(
                "Administrator access required".to_string(),
            ))
        }
    }
}

/// Sign-in options passed to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderConfig {
    /// Only accounts of this organizational domain may sign in
    pub hosted_domain: Option<String>,
}

/// Site rules applied to identities from the provider.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub privileged_email: String,
    pub hosted_domain: Option<String>,
}

impl AuthPolicy {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            hosted_domain: self.hosted_domain.clone(),
        }
    }

    /// State for a provider callback.
    pub fn resolve(&self, identity: Option<Identity>) -> AuthState {
        match identity {
            Some(identity) => {
                let role = derive_role(&identity, &self.privileged_email);
                AuthState::Authenticated { identity, role }
            }
            None => AuthState::Anonymous,
        }
    }

    /// Resolve an identity presented on a request, enforcing the domain.
    pub fn admit(&self, identity: Identity) -> Result<AuthState, AppError> {
        check_hosted_domain(&self.provider_config(), &identity)?;
        Ok(self.resolve(Some(identity)))
    }
}

fn check_hosted_domain(config: &ProviderConfig, identity: &Identity) -> Result<(), AppError> {
    match &config.hosted_domain {
        Some(domain) if identity.hosted_domain.as_deref() != Some(domain.as_str()) => {
            Err(AppError::Unauthorized(format!(
                "Sign-in is restricted to {} accounts",
                domain
            )))
        }
        _ => Ok(()),
    }
}

/// The identity service the session sits on.
pub trait IdentityProvider: Send + Sync + 'static {
    fn current_user(&self) -> Option<Identity>;

    /// Fires with the current user on subscription and after every change.
    fn on_auth_state_change(&self) -> watch::Receiver<Option<Identity>>;

    /// Complete an interactive sign-in with the credential the sign-in popup
    /// produced.
    fn sign_in_with_popup(
        &self,
        config: &ProviderConfig,
        credential: &str,
    ) -> impl Future<Output = Result<Identity, AppError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Provider that accepts signed identity tokens as sign-in credentials.
pub struct TokenIdentityProvider {
    verifier: TokenVerifier,
    current: watch::Sender<Option<Identity>>,
}

impl TokenIdentityProvider {
    pub fn new(verifier: TokenVerifier) -> Self {
        let (current, _) = watch::channel(None);
        Self { verifier, current }
    }
}

impl IdentityProvider for TokenIdentityProvider {
    fn current_user(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    fn on_auth_state_change(&self) -> watch::Receiver<Option<Identity>> {
        let mut rx = self.current.subscribe();
        rx.mark_changed();
        rx
    }

    async fn sign_in_with_popup(
        &self,
        config: &ProviderConfig,
        credential: &str,
    ) -> Result<Identity, AppError> {
        let identity = self.verifier.verify(credential)?;
        check_hosted_domain(config, &identity)?;
        self.current.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.current.send_replace(None);
        Ok(())
    }
}

/// Application-wide session object.
pub struct AuthContext<P: IdentityProvider> {
    provider: Arc<P>,
    policy: AuthPolicy,
    state: watch::Receiver<AuthState>,
    listener: Option<JoinHandle<()>>,
}

impl<P: IdentityProvider> AuthContext<P> {
    /// Start listening to `provider`. The state stays `Unknown` until the
    /// provider's first callback is applied.
    pub fn new(provider: Arc<P>, policy: AuthPolicy) -> Self {
        let (tx, state) = watch::channel(AuthState::Unknown);
        let mut changes = provider.on_auth_state_change();
        let listener_policy = policy.clone();

        let listener = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let identity = changes.borrow_and_update().clone();
                let next = listener_policy.resolve(identity);
                tracing::debug!(
                    signed_in = next.identity().is_some(),
                    admin = next.is_admin(),
                    "Auth state changed"
                );
                if tx.send(next).is_err() {
                    break;
                }
            }
        });

        Self {
            provider,
            policy,
            state,
            listener: Some(listener),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn user(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }

    /// Wait until the provider has reported at least once.
    pub async fn ready(&self) -> AuthState {
        self.wait_for(|s| !s.is_loading()).await
    }

    /// Sign in with `credential`. Failures are logged and leave the state
    /// as it was.
    pub async fn sign_in(&self, credential: &str) -> Result<Navigation, AppError> {
        let identity = match self
            .provider
            .sign_in_with_popup(&self.policy.provider_config(), credential)
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!("Error during sign-in: {}", e);
                return Err(e);
            }
        };

        self.wait_for(|s| s.identity().map(|i| &i.uid) == Some(&identity.uid))
            .await;
        Ok(Navigation::Profile)
    }

    pub async fn sign_out(&self) -> Result<Navigation, AppError> {
        if let Err(e) = self.provider.sign_out().await {
            tracing::error!("Error during sign-out: {}", e);
            return Err(e);
        }
        self.wait_for(|s| matches!(s, AuthState::Anonymous)).await;
        Ok(Navigation::Home)
    }

    /// Stop listening to the provider.
    pub fn shutdown(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }

    async fn wait_for(&self, predicate: impl Fn(&AuthState) -> bool) -> AuthState {
        let mut rx = self.state.clone();
        let state = match rx.wait_for(|s| predicate(s)).await {
            Ok(state) => state.clone(),
            // Listener gone: report whatever was last applied.
            Err(_) => self.state(),
        };
        state
    }
}

impl<P: IdentityProvider> Drop for AuthContext<P> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::token::test_support::claims;
    use super::*;

    const ADMIN_EMAIL: &str = "lugbpdc@dubai.bits-pilani.ac.in";
    const DOMAIN: &str = "dubai.bits-pilani.ac.in";

    fn identity(email: &str, admin_claim: bool) -> Identity {
        Identity {
            uid: "uid".into(),
            email: email.into(),
            display_name: None,
            photo_url: None,
            hosted_domain: Some(DOMAIN.into()),
            admin_claim,
        }
    }

    fn policy() -> AuthPolicy {
        AuthPolicy {
            privileged_email: ADMIN_EMAIL.into(),
            hosted_domain: Some(DOMAIN.into()),
        }
    }

    fn context() -> (AuthContext<TokenIdentityProvider>, TokenVerifier) {
        let verifier = TokenVerifier::new("session-secret");
        let provider = Arc::new(TokenIdentityProvider::new(verifier.clone()));
        (AuthContext::new(provider, policy()), verifier)
    }

    #[test]
    fn test_privileged_email_is_admin_without_claim() {
        assert_eq!(derive_role(&identity(ADMIN_EMAIL, false), ADMIN_EMAIL), Role::Admin);
    }

    #[test]
    fn test_admin_claim_is_admin() {
        let user = identity("someone@dubai.bits-pilani.ac.in", true);
        assert_eq!(derive_role(&user, ADMIN_EMAIL), Role::Admin);
    }

    #[test]
    fn test_neither_is_member() {
        let user = identity("someone@dubai.bits-pilani.ac.in", false);
        assert_eq!(derive_role(&user, ADMIN_EMAIL), Role::Member);
    }

    #[test]
    fn test_privileged_email_match_is_exact() {
        let user = identity(&ADMIN_EMAIL.to_uppercase(), false);
        assert_eq!(derive_role(&user, ADMIN_EMAIL), Role::Member);
    }

    #[test]
    fn test_admit_enforces_hosted_domain() {
        let mut outsider = identity("eve@gmail.com", false);
        outsider.hosted_domain = None;
        assert!(matches!(
            policy().admit(outsider),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_context_starts_loading_then_anonymous() {
        let (ctx, _) = context();
        assert!(ctx.is_loading());
        assert_eq!(ctx.ready().await, AuthState::Anonymous);
        assert!(!ctx.is_loading());
        ctx.shutdown();
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let (ctx, verifier) = context();
        ctx.ready().await;

        let token = verifier.issue(&claims("u7", "ada@dubai.bits-pilani.ac.in"));
        assert_eq!(ctx.sign_in(&token).await.unwrap(), Navigation::Profile);
        assert_eq!(ctx.user().unwrap().uid, "u7");
        assert!(!ctx.is_admin());

        assert_eq!(ctx.sign_out().await.unwrap(), Navigation::Home);
        assert_eq!(ctx.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn test_privileged_sign_in_is_admin() {
        let (ctx, verifier) = context();
        ctx.ready().await;

        let token = verifier.issue(&claims("root", ADMIN_EMAIL));
        ctx.sign_in(&token).await.unwrap();
        assert!(ctx.is_admin());
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_state_unchanged() {
        let (ctx, verifier) = context();
        ctx.ready().await;

        let outsider = verifier.issue(&claims("eve", "eve@gmail.com"));
        assert!(ctx.sign_in(&outsider).await.is_err());
        assert!(ctx.sign_in("not-a-token").await.is_err());
        assert_eq!(ctx.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn test_provider_tracks_current_user() {
        let verifier = TokenVerifier::new("provider-secret");
        let provider = TokenIdentityProvider::new(verifier.clone());
        let config = policy().provider_config();
        assert!(provider.current_user().is_none());

        let outsider = verifier.issue(&claims("eve", "eve@gmail.com"));
        assert!(provider.sign_in_with_popup(&config, &outsider).await.is_err());
        assert!(provider.current_user().is_none());

        let token = verifier.issue(&claims("u9", "linus@dubai.bits-pilani.ac.in"));
        provider.sign_in_with_popup(&config, &token).await.unwrap();
        assert_eq!(provider.current_user().unwrap().uid, "u9");

        provider.sign_out().await.unwrap();
        assert!(provider.current_user().is_none());
    }
}
