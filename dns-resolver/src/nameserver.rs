use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use dns_types::protocol::types::Message;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use crate::error::ResolveError;

/// The maximum size of a UDP response this resolver will accept from
/// an upstream nameserver, matching the cap this resolver itself
/// enforces on the client-facing side.
const MAX_UDP_RESPONSE_SIZE: usize = 512;

/// Send `query` to `nameserver` over UDP and wait for a matching
/// response, giving up after `per_query_timeout`.
///
/// # Errors
///
/// If the socket can't be created or written to, the nameserver
/// doesn't answer in time, or the response can't be decoded.
pub async fn query_nameserver(
    nameserver: Ipv4Addr,
    query: &Message,
    per_query_timeout: Duration,
) -> Result<Message, ResolveError> {
    timeout(per_query_timeout, query_nameserver_notimeout(nameserver, query))
        .await
        .map_err(|_| ResolveError::Timeout)?
}

async fn query_nameserver_notimeout(
    nameserver: Ipv4Addr,
    query: &Message,
) -> Result<Message, ResolveError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    let addr = SocketAddr::from((nameserver, 53));
    socket.connect(addr).await?;

    let request = query.to_octets();
    socket.send(&request).await?;
    debug!(%nameserver, id = query.header.id, "sent query to nameserver");

    let mut buf = [0u8; MAX_UDP_RESPONSE_SIZE];
    let n = socket.recv(&mut buf).await?;

    let response = Message::from_octets(&buf[..n])?;
    if response_matches_request(query, &response) {
        Ok(response)
    } else {
        Err(ResolveError::NoUsableNameserver)
    }
}

/// A response "matches" a request if it carries the same ID and
/// answers the same question the request asked.
fn response_matches_request(request: &Message, response: &Message) -> bool {
    response.header.id == request.header.id
        && response.header.is_response
        && response.questions == request.questions
}

#[cfg(test)]
pub mod test_util {
    use dns_types::protocol::types::{DomainName, Header, Message, Opcode, Question, Rcode, RecordClass, RecordType, ResourceRecord};

    pub fn domain(dotted: &str) -> DomainName {
        DomainName::from_dotted_string(dotted).unwrap()
    }

    pub fn a_record(name: &str, ttl: u32, addr: std::net::Ipv4Addr) -> ResourceRecord {
        ResourceRecord::a(domain(name), ttl, addr)
    }

    pub fn ns_record(name: &str, ttl: u32, target: &str) -> ResourceRecord {
        ResourceRecord::ns(domain(name), ttl, domain(target))
    }

    /// Build a plausible nameserver response message for tests: given
    /// a query, echoes its ID and question and attaches the supplied
    /// records to each section.
    pub fn nameserver_response(
        query: &Message,
        answers: Vec<ResourceRecord>,
        authority: Vec<ResourceRecord>,
        additional: Vec<ResourceRecord>,
    ) -> Message {
        Message {
            header: Header {
                id: query.header.id,
                is_response: true,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: query.header.recursion_desired,
                recursion_available: false,
                z: 0,
                rcode: Rcode::NoError,
            },
            questions: query.questions.clone(),
            answers,
            authority,
            additional,
        }
    }

    pub fn query(qname: &str, qtype: RecordType) -> Message {
        Message::query(
            1,
            Question {
                name: domain(qname),
                qtype,
                qclass: RecordClass::IN,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn matching_response_is_accepted() {
        let request = query("example.com", dns_types::protocol::types::RecordType::A);
        let response = nameserver_response(&request, vec![], vec![], vec![]);
        assert!(response_matches_request(&request, &response));
    }

    #[test]
    fn response_with_wrong_id_is_rejected() {
        let request = query("example.com", dns_types::protocol::types::RecordType::A);
        let mut response = nameserver_response(&request, vec![], vec![], vec![]);
        response.header.id = request.header.id.wrapping_add(1);
        assert!(!response_matches_request(&request, &response));
    }

    #[test]
    fn response_to_a_different_question_is_rejected() {
        let request = query("example.com", dns_types::protocol::types::RecordType::A);
        let mut response = nameserver_response(&request, vec![], vec![], vec![]);
        response.questions[0].name = domain("other.com");
        assert!(!response_matches_request(&request, &response));
    }
}
