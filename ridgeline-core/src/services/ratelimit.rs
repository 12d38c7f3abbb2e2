//! Rate limit service - per-route-class budgets and intrusion signals
//!
//! Each route class has an independent keyed limiter, so exhausting the
//! login budget says nothing about general API calls. Heuristic client
//! inspection is advisory telemetry only - it flags, it never blocks.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::domain::result::{Error, Result};
use crate::domain::ClientInfo;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Route classes with distinct budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Login and registration - tightest budget
    Auth,
    /// Password reset - tightest budget over a longer window
    PasswordReset,
    /// Read-mostly general API
    Api,
    /// State-changing API
    Mutation,
    /// Report generation
    Report,
}

/// User agents shorter than this are flagged as suspicious
const MIN_PLAUSIBLE_UA_LEN: usize = 10;

/// Forwarded-for chains longer than this are flagged as suspicious
const MAX_PLAUSIBLE_PROXY_CHAIN: usize = 5;

fn quota(burst: u32, window: Duration) -> Quota {
    let burst = NonZeroU32::new(burst).expect("burst must be non-zero");
    // Sustained rate of burst-per-window, with the full burst available up front
    let period = window / burst.get();
    Quota::with_period(period)
        .expect("period must be non-zero")
        .allow_burst(burst)
}

/// Service enforcing request budgets per client and route class
pub struct RateLimitService {
    auth: KeyedLimiter,
    password_reset: KeyedLimiter,
    api: KeyedLimiter,
    mutation: KeyedLimiter,
    report: KeyedLimiter,
    clock: DefaultClock,
    bot_pattern: Regex,
}

impl Default for RateLimitService {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitService {
    pub fn new() -> Self {
        Self {
            auth: RateLimiter::keyed(quota(5, Duration::from_secs(15 * 60))),
            password_reset: RateLimiter::keyed(quota(3, Duration::from_secs(60 * 60))),
            api: RateLimiter::keyed(quota(300, Duration::from_secs(15 * 60))),
            mutation: RateLimiter::keyed(quota(60, Duration::from_secs(15 * 60))),
            report: RateLimiter::keyed(quota(20, Duration::from_secs(60 * 60))),
            clock: DefaultClock::default(),
            bot_pattern: Regex::new(
                r"(?i)(curl|wget|python-requests|libwww|bot|crawler|spider|scrapy|headless)",
            )
            .unwrap(),
        }
    }

    /// Check the budget for one request. Over budget yields
    /// [`Error::RateLimited`] with a retry-after hint in whole seconds.
    pub fn check(&self, class: RouteClass, client: &ClientInfo) -> Result<()> {
        let key = self.client_key(class, client);
        let limiter = match class {
            RouteClass::Auth => &self.auth,
            RouteClass::PasswordReset => &self.password_reset,
            RouteClass::Api => &self.api,
            RouteClass::Mutation => &self.mutation,
            RouteClass::Report => &self.report,
        };

        limiter.check_key(&key).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            let mut retry_after_secs = wait.as_secs();
            if wait.subsec_nanos() > 0 || retry_after_secs == 0 {
                retry_after_secs += 1;
            }
            Error::RateLimited { retry_after_secs }
        })
    }

    /// Client identity a budget is tracked against. Auth-adjacent classes
    /// fold in a user-agent fingerprint so one IP cannot reset its budget by
    /// rotating agents unnoticed.
    fn client_key(&self, class: RouteClass, client: &ClientInfo) -> String {
        let ip = client.ip_address.as_deref().unwrap_or("unknown");
        match class {
            RouteClass::Auth | RouteClass::PasswordReset => {
                let ua = client.user_agent.as_deref().unwrap_or("");
                let mut hasher = Sha256::new();
                hasher.update(ua.as_bytes());
                let fingerprint = hex::encode(&hasher.finalize()[..8]);
                format!("{}|{}", ip, fingerprint)
            }
            _ => ip.to_string(),
        }
    }

    /// Heuristic suspicion check. Returns a reason string when the client
    /// looks automated or is hiding behind an implausible proxy chain.
    /// Advisory only: callers record a suspicious-activity audit event and
    /// carry on.
    pub fn inspect(&self, client: &ClientInfo) -> Option<String> {
        match client.user_agent.as_deref() {
            None => return Some("missing user agent".to_string()),
            Some(ua) if ua.len() < MIN_PLAUSIBLE_UA_LEN => {
                return Some("implausibly short user agent".to_string())
            }
            Some(ua) if self.bot_pattern.is_match(ua) => {
                return Some("bot-like user agent".to_string())
            }
            Some(_) => {}
        }

        if client.forwarded_chain_len > MAX_PLAUSIBLE_PROXY_CHAIN {
            return Some(format!(
                "proxy chain of {} hops",
                client.forwarded_chain_len
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(ip: &str) -> ClientInfo {
        ClientInfo {
            ip_address: Some(ip.to_string()),
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".to_string()),
            session_id: None,
            forwarded_chain_len: 1,
        }
    }

    #[test]
    fn test_auth_budget_is_five_per_window() {
        let svc = RateLimitService::new();
        let c = client("203.0.113.7");

        for _ in 0..5 {
            assert!(svc.check(RouteClass::Auth, &c).is_ok());
        }
        let err = svc.check(RouteClass::Auth, &c).unwrap_err();
        match err {
            Error::RateLimited { retry_after_secs } => assert!(retry_after_secs >= 1),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_budgets_are_per_client() {
        let svc = RateLimitService::new();
        for _ in 0..5 {
            svc.check(RouteClass::Auth, &client("203.0.113.7")).unwrap();
        }
        // A different IP is unaffected
        assert!(svc.check(RouteClass::Auth, &client("203.0.113.8")).is_ok());
    }

    #[test]
    fn test_route_classes_are_independent() {
        let svc = RateLimitService::new();
        let c = client("203.0.113.7");
        for _ in 0..5 {
            svc.check(RouteClass::Auth, &c).unwrap();
        }
        assert!(svc.check(RouteClass::Auth, &c).is_err());
        // The general API budget for the same client is untouched
        assert!(svc.check(RouteClass::Api, &c).is_ok());
        assert!(svc.check(RouteClass::Mutation, &c).is_ok());
    }

    #[test]
    fn test_auth_key_includes_agent_fingerprint() {
        let svc = RateLimitService::new();
        let mut a = client("203.0.113.7");
        for _ in 0..5 {
            svc.check(RouteClass::Auth, &a).unwrap();
        }
        assert!(svc.check(RouteClass::Auth, &a).is_err());

        // Same IP with a different agent tracks a separate auth budget
        a.user_agent = Some("Mozilla/5.0 (Macintosh; Intel Mac OS X)".to_string());
        assert!(svc.check(RouteClass::Auth, &a).is_ok());
    }

    #[test]
    fn test_inspect_flags_bad_agents() {
        let svc = RateLimitService::new();

        let mut c = client("203.0.113.7");
        assert!(svc.inspect(&c).is_none());

        c.user_agent = None;
        assert!(svc.inspect(&c).unwrap().contains("missing"));

        c.user_agent = Some("x".to_string());
        assert!(svc.inspect(&c).unwrap().contains("short"));

        c.user_agent = Some("curl/8.4.0".to_string());
        assert!(svc.inspect(&c).unwrap().contains("bot-like"));

        c.user_agent = Some("python-requests/2.31".to_string());
        assert!(svc.inspect(&c).is_some());
    }

    #[test]
    fn test_inspect_flags_long_proxy_chains() {
        let svc = RateLimitService::new();
        let mut c = client("203.0.113.7");
        c.forwarded_chain_len = 9;
        assert!(svc.inspect(&c).unwrap().contains("proxy chain"));
    }
}
