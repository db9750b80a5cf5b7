use dns_types::protocol::deserialise::DecodeError;

/// Everything that can go wrong while walking the referral chain from
/// a root hint down to an answer. Every variant of this ultimately
/// surfaces to the client as `NXDOMAIN`: the wire response never
/// reveals which internal step failed.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no nameserver responded in time")]
    Timeout,

    #[error("network error talking to nameserver: {0}")]
    Network(#[from] std::io::Error),

    #[error("nameserver sent a malformed response: {0}")]
    Decode(#[from] DecodeError),

    #[error("nameserver name resolution exceeded the maximum depth")]
    MaxDepthExceeded,

    #[error("no candidate nameserver could be reached")]
    NoUsableNameserver,

    #[error("referral chain exceeded the maximum number of steps")]
    TooManyReferrals,
}
