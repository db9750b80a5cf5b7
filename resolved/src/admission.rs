use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dns_types::protocol::types::DomainName;

/// The default blacklisted domains, applied when no `--blacklist-file`
/// is given.
pub const DEFAULT_BLACKLIST: &[&str] = &["malicious.com", "phishing.com"];

/// Everything this resolver checks before it will spend any effort
/// resolving a query: size, rate, the RD bit, and the blacklist.
/// Queries that fail any of these are dropped silently, with no wire
/// response at all, rather than answered with an error.
pub struct AdmissionControl {
    max_message_size: usize,
    rate_limit_per_second: u32,
    rate_limit_window: Duration,
    blacklist: HashSet<DomainName>,
    rate_limits: Mutex<HashMap<IpAddr, RateLimitState>>,
}

struct RateLimitState {
    count: u32,
    window_start: Instant,
}

impl AdmissionControl {
    pub fn new(max_message_size: usize, rate_limit_per_second: u32, blacklist: HashSet<DomainName>) -> Self {
        AdmissionControl {
            max_message_size,
            rate_limit_per_second,
            rate_limit_window: Duration::from_secs(1),
            blacklist,
            rate_limits: Mutex::new(HashMap::new()),
        }
    }

    /// Is this raw datagram within the accepted size?
    pub fn accepts_size(&self, len: usize) -> bool {
        len <= self.max_message_size
    }

    /// Has this source exceeded its query budget for the current
    /// one-second window? Admitting the query also counts against it.
    pub fn admit_rate_limited(&self, source: IpAddr) -> bool {
        let mut guard = self.rate_limits.lock().expect("rate limit mutex poisoned");
        let now = Instant::now();

        let state = guard.entry(source).or_insert(RateLimitState {
            count: 0,
            window_start: now,
        });

        if now.duration_since(state.window_start) > self.rate_limit_window {
            state.count = 0;
            state.window_start = now;
        }

        if state.count >= self.rate_limit_per_second {
            false
        } else {
            state.count += 1;
            true
        }
    }

    /// Is this exact name blacklisted? A case-sensitive, exact match
    /// against the qname, not a subdomain or case-folded comparison:
    /// `www.malicious.com` is not blocked by a `malicious.com` entry.
    pub fn is_blacklisted(&self, name: &DomainName) -> bool {
        self.blacklist.contains(name)
    }

    /// Drop rate-limit windows that are already stale, so a source that
    /// queried once and never came back doesn't sit in the table for
    /// the life of the process. Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        let mut guard = self.rate_limits.lock().expect("rate limit mutex poisoned");
        let now = Instant::now();
        let window = self.rate_limit_window;
        let before = guard.len();
        guard.retain(|_, state| now.duration_since(state.window_start) <= window);
        before - guard.len()
    }
}

/// Parse a blacklist file: one dotted domain name per line, blank
/// lines and lines starting with `#` ignored.
///
/// # Errors
///
/// If the file can't be read, or a line isn't a valid domain name.
pub fn load_blacklist_file(path: &std::path::Path) -> std::io::Result<HashSet<DomainName>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_blacklist(&contents))
}

pub fn default_blacklist() -> HashSet<DomainName> {
    parse_blacklist(&DEFAULT_BLACKLIST.join("\n"))
}

fn parse_blacklist(contents: &str) -> HashSet<DomainName> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| DomainName::from_dotted_string(line).ok())
        .collect()
}
