use dns_resolver::{Answer, ResolverConfig, SharedCache};
use dns_types::protocol::types::{Header, Message, Rcode};
use tracing::warn;

/// Resolve the single question carried by `request` and build the
/// response message to send back to the client.
///
/// Any resolution failure — timeout, an unreachable referral chain,
/// a malformed upstream response — is reported to the client as
/// `RCODE=3` (`NXDOMAIN`), the same code used for an authoritative
/// non-existence answer. This is a deliberate, if RFC-unfaithful,
/// choice: see `DESIGN.md` (OQ-2). The distinction is preserved in
/// the logs even though it isn't on the wire.
pub async fn resolve_and_build_response(
    request: &Message,
    cache: &SharedCache,
    config: &ResolverConfig,
) -> Message {
    let question = &request.questions[0];

    let outcome = dns_resolver::resolve(&question.name, question.qtype, question.qclass, cache, config).await;

    let (rcode, answers, authority, additional) = match outcome {
        Ok(Answer {
            answers,
            authority,
            additional,
        }) => (Rcode::NoError, answers, authority, additional),
        Err(err) => {
            warn!(name = %question.name, qtype = %question.qtype, error = %err, "resolution failed");
            (Rcode::NameError, vec![], vec![], vec![])
        }
    };

    Message {
        header: build_response_header(request.header, rcode),
        questions: request.questions.clone(),
        answers,
        authority,
        additional,
    }
}

fn build_response_header(request_header: Header, rcode: Rcode) -> Header {
    request_header.into_response(rcode)
}

/// Build the response to a malformed or otherwise unservable request
/// that never reached resolution: used when the admission layer
/// rejects a query for a reason the client should still be told about
/// (as opposed to a silent drop).
pub fn format_error_response(request: &Message) -> Message {
    Message {
        header: request.header.into_response(Rcode::FormatError),
        questions: request.questions.clone(),
        answers: vec![],
        authority: vec![],
        additional: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::{DomainName, Question, RecordClass, RecordType};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn query(qname: &str) -> Message {
        Message::query(
            7,
            Question {
                name: DomainName::from_dotted_string(qname).unwrap(),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        )
    }

    fn config() -> ResolverConfig {
        ResolverConfig {
            root_hints: vec![Ipv4Addr::new(198, 41, 0, 4)],
            per_query_timeout: Duration::from_millis(1),
            overall_timeout: Duration::from_millis(5),
            max_ns_resolution_depth: 8,
        }
    }

    #[tokio::test]
    async fn serves_a_cached_answer_without_touching_the_network() {
        let request = query("example.com");
        let cache = SharedCache::new(Duration::from_secs(300), 512);
        cache.insert(
            &request.questions[0].name,
            RecordType::A,
            RecordClass::IN,
            vec![dns_types::protocol::types::ResourceRecord::a(
                request.questions[0].name.clone(),
                300,
                Ipv4Addr::new(93, 184, 216, 34),
            )],
            vec![],
            vec![],
        );

        let response = resolve_and_build_response(&request, &cache, &config()).await;

        assert!(response.header.is_response);
        assert_eq!(response.header.rcode, Rcode::NoError);
        assert_eq!(response.answers.len(), 1);
    }

    #[tokio::test]
    async fn an_unreachable_root_hint_produces_nxdomain_on_the_wire() {
        let request = query("example.com");
        let cache = SharedCache::new(Duration::from_secs(300), 512);
        // 192.0.2.0/24 is reserved for documentation (RFC 5737), so
        // nothing answers here and the resolution fails quickly.
        let mut cfg = config();
        cfg.root_hints = vec![Ipv4Addr::new(192, 0, 2, 1)];

        let response = resolve_and_build_response(&request, &cache, &cfg).await;

        assert_eq!(response.header.rcode, Rcode::NameError);
        assert!(response.answers.is_empty());
    }

    #[test]
    fn format_error_response_preserves_the_question() {
        let request = query("example.com");
        let response = format_error_response(&request);
        assert_eq!(response.header.rcode, Rcode::FormatError);
        assert_eq!(response.questions, request.questions);
    }
}
