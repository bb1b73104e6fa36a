use tracing::{info, warn};
use worktrack_core::timer::{Provider, TimerDisplay, TimerPatch};

use crate::cache::QueryCache;
use crate::http::AuthEvent;
use crate::{Credentials, ServiceError, TrackerService};

/// Client-side state for one time-tracking provider: whether its session is
/// live, what the timer widget shows, and a sticky error the user has to
/// dismiss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    provider: Provider,
    authenticated: bool,
    authenticating: bool,
    timer: TimerDisplay,
    error: Option<String>,
}

impl ProviderSession {
    pub fn new(provider: Provider, authenticated: bool) -> Self {
        Self {
            provider,
            authenticated,
            authenticating: false,
            timer: TimerDisplay::default(),
            error: None,
        }
    }

    /// Seeded from whether the provider's session cookies are present.
    pub fn from_service(provider: Provider, service: &dyn TrackerService) -> Self {
        Self::new(provider, service.has_session(provider))
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// A login request is out.
    pub fn is_authenticating(&self) -> bool {
        self.authenticating
    }

    pub fn timer(&self) -> &TimerDisplay {
        &self.timer
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub async fn authenticate(
        &mut self,
        service: &dyn TrackerService,
        cache: &QueryCache,
        credentials: &Credentials,
        on_success: impl FnOnce(),
    ) -> Result<(), ServiceError> {
        if self.authenticating {
            return Err(ServiceError::InvalidInput(format!(
                "{} login already in progress",
                self.provider
            )));
        }
        self.authenticating = true;
        let result = service.authenticate(self.provider, credentials).await;
        self.authenticating = false;

        if let Err(e) = result {
            warn!(provider = self.provider.as_str(), "authentication failed: {e}");
            // Leftover cookies would reseed the next session as logged in.
            service.clear_session(self.provider);
            self.authenticated = false;
            return Err(e);
        }
        info!(provider = self.provider.as_str(), "authenticated");
        self.authenticated = true;
        self.error = None;
        let provider = self.provider;
        cache.invalidate_where(|k| k.provider() == Some(provider));
        on_success();
        Ok(())
    }

    /// Log out: clear the provider's cookies and forget its cached data.
    pub fn reset(&mut self, service: &dyn TrackerService, cache: &QueryCache) {
        service.clear_session(self.provider);
        let provider = self.provider;
        cache.invalidate_where(|k| k.provider() == Some(provider));
        self.authenticated = false;
        self.timer = TimerDisplay::default();
        self.error = None;
    }

    pub fn set_timer(&mut self, patch: TimerPatch) {
        self.timer.apply(patch);
    }

    /// React to a 401. Returns whether the event was for this provider.
    pub fn handle_auth_event(&mut self, event: AuthEvent) -> bool {
        match event {
            AuthEvent::ProviderExpired(p) if p == self.provider => {
                if self.authenticated {
                    self.error = Some(format!(
                        "{} session expired, please log in again",
                        self.provider
                    ));
                }
                self.authenticated = false;
                self.timer = TimerDisplay::default();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpConfig, HttpService};

    /// Nothing listens on the discard port, so every request fails.
    fn unreachable_service() -> HttpService {
        HttpService::new(&HttpConfig::single("http://127.0.0.1:9/api"))
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "me".into(),
            password: "pw".into(),
        }
    }

    #[tokio::test]
    async fn failed_login_clears_provider_cookies() {
        let service = unreachable_service();
        service.cookies().store_set_cookie("127.0.0.1", "mt_session=old");
        service.cookies().store_set_cookie("127.0.0.1", "tt_session=keep");
        let cache = QueryCache::default();
        let mut session = ProviderSession::from_service(Provider::Milltime, &service);
        assert!(session.is_authenticated());

        let mut called = false;
        let result = session
            .authenticate(&service, &cache, &credentials(), || called = true)
            .await;

        assert!(result.is_err());
        assert!(!called);
        assert!(!session.is_authenticated());
        assert!(!session.is_authenticating());
        assert!(!service.has_session(Provider::Milltime));
        assert!(service.has_session(Provider::TimeTracking));
        assert!(!ProviderSession::from_service(Provider::Milltime, &service).is_authenticated());
    }

    #[tokio::test]
    async fn second_login_while_in_flight_is_rejected() {
        let service = unreachable_service();
        let cache = QueryCache::default();
        let mut session = ProviderSession::new(Provider::TimeTracking, false);
        session.authenticating = true;

        let result = session
            .authenticate(&service, &cache, &credentials(), || {})
            .await;

        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
        assert!(session.is_authenticating());
    }

    #[test]
    fn new_session_is_not_authenticating() {
        assert!(!ProviderSession::new(Provider::Milltime, true).is_authenticating());
    }

    #[test]
    fn expiry_only_affects_matching_provider() {
        let mut mt = ProviderSession::new(Provider::Milltime, true);
        let mut tt = ProviderSession::new(Provider::TimeTracking, true);
        let event = AuthEvent::ProviderExpired(Provider::Milltime);

        assert!(mt.handle_auth_event(event));
        assert!(!tt.handle_auth_event(event));
        assert!(!mt.is_authenticated());
        assert!(tt.is_authenticated());
        assert!(mt.error().is_some());
    }

    #[test]
    fn expiry_when_already_logged_out_records_no_error() {
        let mut session = ProviderSession::new(Provider::Milltime, false);
        assert!(session.handle_auth_event(AuthEvent::ProviderExpired(Provider::Milltime)));
        assert!(session.error().is_none());
    }

    #[test]
    fn login_required_is_not_a_provider_event() {
        let mut session = ProviderSession::new(Provider::Milltime, true);
        assert!(!session.handle_auth_event(AuthEvent::LoginRequired));
        assert!(session.is_authenticated());
    }

    #[test]
    fn error_is_sticky_until_dismissed() {
        let mut session = ProviderSession::new(Provider::TimeTracking, true);
        session.handle_auth_event(AuthEvent::ProviderExpired(Provider::TimeTracking));
        session.set_timer(TimerPatch {
            visible: Some(true),
            ..Default::default()
        });
        assert!(session.error().is_some());
        session.dismiss_error();
        assert!(session.error().is_none());
        assert!(session.timer().visible);
    }
}
