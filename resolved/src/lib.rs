pub mod admission;
pub mod facade;

use std::net::SocketAddr;
use std::sync::Arc;

use dns_resolver::{ResolverConfig, SharedCache};
use dns_types::protocol::types::Message;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use admission::AdmissionControl;

/// Accept datagrams on `socket` forever, spawning a task per datagram.
/// Returns only if the socket itself errors out.
///
/// # Errors
///
/// If reading from the socket fails.
pub async fn listen_udp(
    socket: Arc<UdpSocket>,
    cache: SharedCache,
    admission: Arc<AdmissionControl>,
    config: Arc<ResolverConfig>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; 65535];

    loop {
        let (len, source) = socket.recv_from(&mut buf).await?;

        if !admission.accepts_size(len) {
            warn!(%source, len, "dropping oversized datagram");
            continue;
        }

        let datagram = buf[..len].to_vec();
        let socket = Arc::clone(&socket);
        let cache = cache.clone();
        let admission = Arc::clone(&admission);
        let config = Arc::clone(&config);

        tokio::spawn(async move {
            handle_datagram(socket, cache, admission, config, datagram, source).await;
        });
    }
}

/// Run a single query through admission control and, if admitted,
/// resolution, then send the response back to `source` on `socket`.
/// Any rejection at the admission stage is a silent drop: no response
/// is sent at all.
pub async fn handle_datagram(
    socket: Arc<UdpSocket>,
    cache: SharedCache,
    admission: Arc<AdmissionControl>,
    config: Arc<ResolverConfig>,
    datagram: Vec<u8>,
    source: SocketAddr,
) {
    if !admission.admit_rate_limited(source.ip()) {
        warn!(%source, "dropping query, rate limit exceeded");
        return;
    }

    let request = match Message::from_octets(&datagram) {
        Ok(request) => request,
        Err(err) => {
            debug!(%source, error = %err, "dropping malformed datagram");
            return;
        }
    };

    if !request.header.recursion_desired {
        debug!(%source, id = request.header.id, "dropping query with RD unset");
        return;
    }

    if request.questions.len() != 1 {
        debug!(%source, id = request.header.id, "dropping query with other than one question");
        return;
    }

    if admission.is_blacklisted(&request.questions[0].name) {
        warn!(%source, name = %request.questions[0].name, "dropping query for blacklisted domain");
        return;
    }

    let response = facade::resolve_and_build_response(&request, &cache, &config).await;

    let response_octets = response.to_octets();
    if let Err(err) = socket.send_to(&response_octets, source).await {
        warn!(%source, error = %err, "failed to send response");
    }
}
