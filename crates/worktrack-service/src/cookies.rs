use std::collections::BTreeMap;
use std::sync::Mutex;

/// Cookies set by the backends, keyed by (domain, name).
///
/// A cookie belongs to the host that set it, or to the configured parent
/// domain when its `Domain` attribute names it and the setting host lies
/// under it. Requests only carry cookies for their own host plus the parent
/// domain. Path, expiry and secure attributes are not modelled; a cookie
/// lives until it is cleared or the server expires it with `Max-Age=0`.
pub struct CookieJar {
    /// Hosts whose provider cookies `clear_prefixed` removes. The first one
    /// is the application host.
    hosts: Vec<String>,
    parent_domain: Option<String>,
    cookies: Mutex<BTreeMap<(String, String), String>>,
}

impl CookieJar {
    pub fn new(host: &str, parent_domain: Option<&str>) -> Self {
        Self {
            hosts: vec![host.to_ascii_lowercase()],
            parent_domain: parent_domain
                .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty()),
            cookies: Mutex::new(BTreeMap::new()),
        }
    }

    /// Track another backend host, e.g. the time-tracking API.
    pub fn with_host(mut self, host: &str) -> Self {
        let host = host.to_ascii_lowercase();
        if !host.is_empty() && !self.hosts.contains(&host) {
            self.hosts.push(host);
        }
        self
    }

    pub fn host(&self) -> &str {
        self.hosts.first().map(String::as_str).unwrap_or_default()
    }

    pub fn parent_domain(&self) -> Option<&str> {
        self.parent_domain.as_deref()
    }

    fn with_cookies<R>(&self, f: impl FnOnce(&mut BTreeMap<(String, String), String>) -> R) -> R {
        match self.cookies.lock() {
            Ok(mut guard) => f(&mut *guard),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }

    fn under_parent(&self, host: &str) -> bool {
        self.parent_domain
            .as_deref()
            .is_some_and(|parent| domain_matches(host, parent))
    }

    /// Domain a cookie set by `request_host` is filed under.
    fn domain_for(&self, request_host: &str, attr: Option<&str>) -> String {
        let request_host = request_host.to_ascii_lowercase();
        match attr.map(|d| d.trim_start_matches('.').to_ascii_lowercase()) {
            Some(d)
                if Some(d.as_str()) == self.parent_domain.as_deref()
                    && self.under_parent(&request_host) =>
            {
                d
            }
            _ => request_host,
        }
    }

    /// Store a cookie as if the application host had set it.
    pub fn insert(&self, domain: &str, name: &str, value: &str) {
        let domain = self.domain_for(self.host(), Some(domain));
        self.with_cookies(|c| {
            c.insert((domain, name.to_string()), value.to_string());
        });
    }

    /// Apply one `Set-Cookie` header value received from `request_host`.
    pub fn store_set_cookie(&self, request_host: &str, header: &str) {
        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|nv| nv.split_once('=')) else {
            return;
        };
        let name = name.trim().to_string();
        let value = value.trim().trim_matches('"').to_string();
        if name.is_empty() {
            return;
        }

        let mut domain_attr = None;
        let mut expired = false;
        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            if key.eq_ignore_ascii_case("domain") {
                domain_attr = Some(val.to_string());
            } else if key.eq_ignore_ascii_case("max-age") {
                expired = val.parse::<i64>().map(|v| v <= 0).unwrap_or(false);
            }
        }

        let domain = self.domain_for(request_host, domain_attr.as_deref());
        self.with_cookies(|c| {
            if expired || value.is_empty() {
                c.remove(&(domain, name));
            } else {
                c.insert((domain, name), value);
            }
        });
    }

    /// `Cookie` request header for a request to `request_host`.
    pub fn header_value(&self, request_host: &str) -> Option<String> {
        let request_host = request_host.to_ascii_lowercase();
        let parent_applies = self.under_parent(&request_host);
        let pairs = self.with_cookies(|c| {
            c.iter()
                .filter(|((domain, _), _)| {
                    *domain == request_host
                        || (parent_applies && Some(domain.as_str()) == self.parent_domain.as_deref())
                })
                .map(|((_, name), value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
        });
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    pub fn has_prefixed(&self, prefix: &str) -> bool {
        self.with_cookies(|c| c.keys().any(|(_, name)| name.starts_with(prefix)))
    }

    /// Remove every cookie whose name starts with `prefix`, on the tracked
    /// hosts and on the parent domain. Returns how many were removed.
    pub fn clear_prefixed(&self, prefix: &str) -> usize {
        let hosts = &self.hosts;
        let parent = self.parent_domain.as_deref();
        self.with_cookies(|c| {
            let before = c.len();
            c.retain(|(domain, name), _| {
                let tracked = hosts.contains(domain) || Some(domain.as_str()) == parent;
                !(tracked && name.starts_with(prefix))
            });
            before - c.len()
        })
    }

    pub fn len(&self) -> usize {
        self.with_cookies(|c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = "app.example.com";

    fn jar() -> CookieJar {
        CookieJar::new(APP, Some(".example.com")).with_host("time.other.net")
    }

    #[test]
    fn stores_and_sends_cookies() {
        let jar = jar();
        jar.store_set_cookie(APP, "mt_session=abc; Path=/; HttpOnly");
        jar.store_set_cookie(APP, "other=1");
        assert_eq!(jar.header_value(APP).as_deref(), Some("mt_session=abc; other=1"));
    }

    #[test]
    fn cookies_stay_with_the_host_that_set_them() {
        let jar = jar();
        jar.store_set_cookie(APP, "core_session=secret");
        jar.store_set_cookie("time.other.net", "tt_session=t1");

        assert_eq!(jar.header_value(APP).as_deref(), Some("core_session=secret"));
        assert_eq!(
            jar.header_value("time.other.net").as_deref(),
            Some("tt_session=t1")
        );
        assert!(jar.header_value("unrelated.org").is_none());
    }

    #[test]
    fn parent_domain_cookies_reach_sibling_hosts_only() {
        let jar = jar();
        jar.store_set_cookie(APP, "mt_user=parent; Domain=.example.com");
        assert_eq!(
            jar.header_value("time.example.com").as_deref(),
            Some("mt_user=parent")
        );
        assert!(jar.header_value("time.other.net").is_none());
        assert!(jar.header_value("badexample.com").is_none());
    }

    #[test]
    fn domain_attr_outside_the_parent_is_ignored() {
        let jar = jar();
        jar.store_set_cookie("time.other.net", "tt_x=1; Domain=.example.com");
        assert!(jar.header_value(APP).is_none());
        assert_eq!(jar.header_value("time.other.net").as_deref(), Some("tt_x=1"));
    }

    #[test]
    fn max_age_zero_expires() {
        let jar = jar();
        jar.store_set_cookie(APP, "mt_session=abc");
        jar.store_set_cookie(APP, "mt_session=; Max-Age=0");
        assert!(jar.is_empty());
    }

    #[test]
    fn clear_prefixed_covers_host_and_parent_domain() {
        let jar = jar();
        jar.store_set_cookie(APP, "mt_session=host");
        jar.store_set_cookie(APP, "mt_user=parent; Domain=.example.com");
        jar.store_set_cookie(APP, "tt_session=keep");
        jar.store_set_cookie(APP, "app=keep");
        assert!(jar.has_prefixed("mt_"));

        assert_eq!(jar.clear_prefixed("mt_"), 2);
        assert!(!jar.has_prefixed("mt_"));
        assert!(jar.has_prefixed("tt_"));
        assert_eq!(jar.len(), 2);
    }

    #[test]
    fn clear_prefixed_covers_time_api_host() {
        let jar = jar();
        jar.store_set_cookie("time.other.net", "tt_session=t1");
        jar.store_set_cookie("stranger.org", "tt_session=t2");
        assert_eq!(jar.clear_prefixed("tt_"), 1);
        assert_eq!(jar.len(), 1);
    }

    #[test]
    fn unknown_domain_attr_is_scoped_to_host() {
        let jar = jar();
        jar.insert("elsewhere.org", "mt_x", "1");
        assert_eq!(jar.header_value(APP).as_deref(), Some("mt_x=1"));
        assert_eq!(jar.clear_prefixed("mt_"), 1);
    }

    #[test]
    fn malformed_header_is_ignored() {
        let jar = jar();
        jar.store_set_cookie(APP, "no-equals-sign");
        jar.store_set_cookie(APP, "=value");
        assert!(jar.is_empty());
    }
}
