use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dns_types::protocol::types::{DomainName, RecordClass, RecordType, ResourceRecord};

const MUTEX_POISON_MESSAGE: &str = "dns-resolver cache mutex poisoned";

/// The key a response is cached under: the query name (lowercased),
/// type, and class. Case is folded here rather than preserved, since
/// DNS name comparisons are case-insensitive (RFC 1035 section 2.3.3).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct CacheKey {
    name: DomainName,
    qtype: RecordType,
    qclass: RecordClass,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    answers: Vec<ResourceRecord>,
    authority: Vec<ResourceRecord>,
    additional: Vec<ResourceRecord>,
    inserted_at: Instant,
}

/// A decoded response, as handed back by the cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

/// A TTL-keyed cache of complete upstream responses.
///
/// Every entry lives for a single flat duration regardless of the TTL
/// carried by the individual records it holds: this sidesteps the
/// complexity (and abuse surface) of per-record expiry bookkeeping, at
/// the cost of occasionally serving an answer a little longer than
/// its origin server intended. A second lookup for the same
/// `(name, type, class)` tuple while an entry is live always replaces
/// it outright; entries are never merged.
#[derive(Clone)]
pub struct SharedCache {
    inner: Arc<Mutex<HashMap<CacheKey, CacheEntry>>>,
    ttl: Duration,
    capacity: usize,
}

impl SharedCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        SharedCache {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            capacity,
        }
    }

    /// Look up a cached response, transparently dropping (and
    /// discarding) any entry found to have expired.
    pub fn get(&self, name: &DomainName, qtype: RecordType, qclass: RecordClass) -> Option<CachedResponse> {
        let key = CacheKey {
            name: name.to_canonical(),
            qtype,
            qclass,
        };

        let mut guard = self.inner.lock().expect(MUTEX_POISON_MESSAGE);
        let expired = match guard.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };

        if expired {
            guard.remove(&key);
            return None;
        }

        guard.get(&key).map(|entry| CachedResponse {
            answers: entry.answers.clone(),
            authority: entry.authority.clone(),
            additional: entry.additional.clone(),
        })
    }

    /// Insert, or entirely replace, the cached response for a query.
    pub fn insert(
        &self,
        name: &DomainName,
        qtype: RecordType,
        qclass: RecordClass,
        answers: Vec<ResourceRecord>,
        authority: Vec<ResourceRecord>,
        additional: Vec<ResourceRecord>,
    ) {
        let key = CacheKey {
            name: name.to_canonical(),
            qtype,
            qclass,
        };
        let entry = CacheEntry {
            answers,
            authority,
            additional,
            inserted_at: Instant::now(),
        };

        let mut guard = self.inner.lock().expect(MUTEX_POISON_MESSAGE);
        guard.insert(key, entry);

        if guard.len() > self.capacity {
            if let Some(oldest) = guard
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone())
            {
                guard.remove(&oldest);
            }
        }
    }

    /// Sweep expired entries. Returns the number removed.
    pub fn prune(&self) -> usize {
        let mut guard = self.inner.lock().expect(MUTEX_POISON_MESSAGE);
        let ttl = self.ttl;
        let before = guard.len();
        guard.retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
        before - guard.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect(MUTEX_POISON_MESSAGE).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread::sleep;

    fn name(dotted: &str) -> DomainName {
        DomainName::from_dotted_string(dotted).unwrap()
    }

    #[test]
    fn caches_and_returns_a_response() {
        let cache = SharedCache::new(Duration::from_secs(300), 512);
        let qname = name("example.com");
        let rr = ResourceRecord::a(qname.clone(), 60, Ipv4Addr::new(93, 184, 216, 34));

        assert!(cache.get(&qname, RecordType::A, RecordClass::IN).is_none());

        cache.insert(&qname, RecordType::A, RecordClass::IN, vec![rr.clone()], vec![], vec![]);

        let cached = cache.get(&qname, RecordType::A, RecordClass::IN).unwrap();
        assert_eq!(cached.answers, vec![rr]);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let cache = SharedCache::new(Duration::from_secs(300), 512);
        let rr = ResourceRecord::a(name("Example.COM"), 60, Ipv4Addr::new(1, 2, 3, 4));
        cache.insert(&name("Example.COM"), RecordType::A, RecordClass::IN, vec![rr], vec![], vec![]);

        assert!(cache.get(&name("example.com"), RecordType::A, RecordClass::IN).is_some());
    }

    #[test]
    fn expires_entries_past_their_ttl() {
        let cache = SharedCache::new(Duration::from_millis(10), 512);
        let qname = name("example.com");
        cache.insert(&qname, RecordType::A, RecordClass::IN, vec![], vec![], vec![]);

        sleep(Duration::from_millis(30));

        assert!(cache.get(&qname, RecordType::A, RecordClass::IN).is_none());
    }

    #[test]
    fn a_second_insert_replaces_rather_than_merges() {
        let cache = SharedCache::new(Duration::from_secs(300), 512);
        let qname = name("example.com");
        let first = ResourceRecord::a(qname.clone(), 60, Ipv4Addr::new(1, 1, 1, 1));
        let second = ResourceRecord::a(qname.clone(), 60, Ipv4Addr::new(2, 2, 2, 2));

        cache.insert(&qname, RecordType::A, RecordClass::IN, vec![first], vec![], vec![]);
        cache.insert(&qname, RecordType::A, RecordClass::IN, vec![second.clone()], vec![], vec![]);

        let cached = cache.get(&qname, RecordType::A, RecordClass::IN).unwrap();
        assert_eq!(cached.answers, vec![second]);
    }

    #[test]
    fn evicts_the_oldest_entry_once_over_capacity() {
        let cache = SharedCache::new(Duration::from_secs(300), 2);

        cache.insert(&name("a.com"), RecordType::A, RecordClass::IN, vec![], vec![], vec![]);
        sleep(Duration::from_millis(5));
        cache.insert(&name("b.com"), RecordType::A, RecordClass::IN, vec![], vec![], vec![]);
        sleep(Duration::from_millis(5));
        cache.insert(&name("c.com"), RecordType::A, RecordClass::IN, vec![], vec![], vec![]);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&name("a.com"), RecordType::A, RecordClass::IN).is_none());
        assert!(cache.get(&name("c.com"), RecordType::A, RecordClass::IN).is_some());
    }
}
