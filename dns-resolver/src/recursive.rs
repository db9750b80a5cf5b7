use std::net::Ipv4Addr;
use std::time::Duration;

use async_recursion::async_recursion;
use dns_types::protocol::types::{
    DomainName, Header, Message, Opcode, Question, Rcode, RecordClass, RecordData, RecordType,
    ResourceRecord,
};
use rand::Rng;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::cache::SharedCache;
use crate::error::ResolveError;
use crate::nameserver::query_nameserver;

/// Knobs that shape how a resolution walks the referral chain. All of
/// these have CLI-configurable defaults; see the `resolved` binary.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub root_hints: Vec<Ipv4Addr>,
    pub per_query_timeout: Duration,
    pub overall_timeout: Duration,
    pub max_ns_resolution_depth: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            root_hints: vec![Ipv4Addr::new(198, 41, 0, 4)],
            per_query_timeout: Duration::from_secs(5),
            overall_timeout: Duration::from_secs(15),
            max_ns_resolution_depth: 8,
        }
    }
}

/// The result of a successful walk: the records answering the
/// question (empty, with an authority section, for an authoritative
/// "this name doesn't exist" response — the engine doesn't special-case
/// that distinct from any other resolution failure; see `facade`).
#[derive(Debug, Clone)]
pub struct Answer {
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

/// Resolve `qname`/`qtype`/`qclass`, starting from the cache, then
/// walking the referral chain from the configured root hints. Bounded
/// by `config.overall_timeout` regardless of how many referral hops
/// or nameserver-name resolutions that takes.
///
/// # Errors
///
/// If the overall timeout elapses, or the referral chain can't make
/// progress (every candidate nameserver is unreachable or sends
/// something unusable).
pub async fn resolve(
    qname: &DomainName,
    qtype: RecordType,
    qclass: RecordClass,
    cache: &SharedCache,
    config: &ResolverConfig,
) -> Result<Answer, ResolveError> {
    timeout(
        config.overall_timeout,
        resolve_notimeout(qname, qtype, qclass, cache, config, 0),
    )
    .await
    .map_err(|_| ResolveError::Timeout)?
}

#[async_recursion]
async fn resolve_notimeout(
    qname: &DomainName,
    qtype: RecordType,
    qclass: RecordClass,
    cache: &SharedCache,
    config: &ResolverConfig,
    ns_resolution_depth: u32,
) -> Result<Answer, ResolveError> {
    if let Some(cached) = cache.get(qname, qtype, qclass) {
        trace!(%qname, %qtype, "cache hit");
        return Ok(Answer {
            answers: cached.answers,
            authority: cached.authority,
            additional: cached.additional,
        });
    }

    let question = Question {
        name: qname.clone(),
        qtype,
        qclass,
    };

    let mut candidates = config.root_hints.clone();
    if candidates.is_empty() {
        return Err(ResolveError::NoUsableNameserver);
    }

    // Bounded by the number of root hints plus a generous allowance
    // for referral hops: each hop narrows the zone, so this can't
    // loop forever even though nothing here explicitly counts zones.
    for _ in 0..32 {
        let Some(nameserver) = candidates.first().copied() else {
            return Err(ResolveError::NoUsableNameserver);
        };

        let query = Message::query(rand_query_id(), question.clone());
        let response = match query_nameserver(nameserver, &query, config.per_query_timeout).await {
            Ok(response) => response,
            Err(err) => {
                debug!(%nameserver, error = %err, "nameserver unreachable, trying next candidate");
                candidates.remove(0);
                continue;
            }
        };

        match classify(&response) {
            NameserverOutcome::Answer => {
                cache.insert(
                    qname,
                    qtype,
                    qclass,
                    response.answers.clone(),
                    response.authority.clone(),
                    response.additional.clone(),
                );
                return Ok(Answer {
                    answers: response.answers,
                    authority: response.authority,
                    additional: response.additional,
                });
            }
            NameserverOutcome::Referral => {
                let ns_names = referral_targets(&response);
                if ns_names.is_empty() {
                    candidates.remove(0);
                    continue;
                }

                let mut next_candidates = Vec::new();
                for ns_name in &ns_names {
                    if let Some(glue) = glue_address(&response, ns_name) {
                        next_candidates.push(glue);
                        continue;
                    }

                    if ns_resolution_depth >= config.max_ns_resolution_depth {
                        warn!(%ns_name, "max nameserver resolution depth reached, skipping");
                        continue;
                    }

                    match resolve_notimeout(
                        ns_name,
                        RecordType::A,
                        RecordClass::IN,
                        cache,
                        config,
                        ns_resolution_depth + 1,
                    )
                    .await
                    {
                        Ok(answer) => {
                            next_candidates.extend(answer.answers.iter().filter_map(a_record_address));
                        }
                        Err(_) => continue,
                    }
                }

                if next_candidates.is_empty() {
                    candidates.remove(0);
                    continue;
                }

                candidates = next_candidates;
            }
            NameserverOutcome::Failure => {
                candidates.remove(0);
            }
        }
    }

    Err(ResolveError::TooManyReferrals)
}

enum NameserverOutcome {
    Answer,
    Referral,
    Failure,
}

/// Classify a nameserver's response purely by section counts, exactly
/// as the referral walk does: an answer if `ancount > 0`, a referral
/// if `nscount > 0`, a dead end otherwise. The `RCODE` is deliberately
/// not consulted here — an authoritative `NXDOMAIN` with an empty
/// authority section falls out as `Failure` the same as any other
/// unproductive response, which is what ultimately surfaces to the
/// client as `NXDOMAIN` regardless of which of the two it was (see
/// `facade`).
fn classify(response: &Message) -> NameserverOutcome {
    if !response.answers.is_empty() {
        NameserverOutcome::Answer
    } else if !response.authority.is_empty() {
        NameserverOutcome::Referral
    } else {
        NameserverOutcome::Failure
    }
}

fn referral_targets(response: &Message) -> Vec<DomainName> {
    response
        .authority
        .iter()
        .filter_map(|rr| match &rr.data {
            RecordData::Ns { nsdname } => Some(nsdname.clone()),
            _ => None,
        })
        .collect()
}

/// Find a glue address for `ns_name` in the additional section, if the
/// nameserver was kind enough to include one: this avoids a wasteful
/// extra resolution of a name we were handed the address for already.
fn glue_address(response: &Message, ns_name: &DomainName) -> Option<Ipv4Addr> {
    response
        .additional
        .iter()
        .find(|rr| rr.name == *ns_name && rr.rtype() == RecordType::A)
        .and_then(a_record_address)
}

fn a_record_address(rr: &ResourceRecord) -> Option<Ipv4Addr> {
    match &rr.data {
        RecordData::A { address } => Some(*address),
        _ => None,
    }
}

fn rand_query_id() -> u16 {
    rand::thread_rng().gen()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_an_answer() {
        let mut response = empty_response();
        response.answers.push(ResourceRecord::a(
            DomainName::from_dotted_string("example.com").unwrap(),
            300,
            Ipv4Addr::new(1, 2, 3, 4),
        ));
        assert!(matches!(classify(&response), NameserverOutcome::Answer));
    }

    #[test]
    fn classifies_a_referral() {
        let mut response = empty_response();
        response.authority.push(ResourceRecord::ns(
            DomainName::from_dotted_string("example.com").unwrap(),
            300,
            DomainName::from_dotted_string("ns1.example.com").unwrap(),
        ));
        assert!(matches!(classify(&response), NameserverOutcome::Referral));
    }

    #[test]
    fn classifies_a_name_error_response_as_a_failure() {
        // An authoritative NXDOMAIN with nothing in its authority
        // section is just as unproductive as any other dead end; the
        // RCODE isn't consulted.
        let mut response = empty_response();
        response.header.rcode = Rcode::NameError;
        assert!(matches!(classify(&response), NameserverOutcome::Failure));
    }

    #[test]
    fn classifies_a_failure_with_no_usable_records() {
        let response = empty_response();
        assert!(matches!(classify(&response), NameserverOutcome::Failure));
    }

    #[test]
    fn finds_glue_address_for_a_referred_nameserver() {
        let mut response = empty_response();
        let ns_name = DomainName::from_dotted_string("ns1.example.com").unwrap();
        response
            .additional
            .push(ResourceRecord::a(ns_name.clone(), 300, Ipv4Addr::new(5, 6, 7, 8)));

        assert_eq!(glue_address(&response, &ns_name), Some(Ipv4Addr::new(5, 6, 7, 8)));
    }

    fn empty_response() -> Message {
        Message {
            header: Header {
                id: 1,
                is_response: true,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: true,
                recursion_available: true,
                z: 0,
                rcode: Rcode::NoError,
            },
            questions: vec![],
            answers: vec![],
            authority: vec![],
            additional: vec![],
        }
    }
}
