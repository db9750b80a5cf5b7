use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dns_resolver::{ResolverConfig, SharedCache};
use tokio::net::UdpSocket;
use tracing::{debug, info};

use resolved::admission::{self, AdmissionControl};

/// A recursive DNS resolver: accepts UDP queries, walks the referral
/// chain from a set of root hints down to an answer, and caches the
/// result.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen for UDP queries on.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen for UDP queries on.
    #[arg(long, default_value_t = 2053)]
    port: u16,

    /// Path to a file of blacklisted domains, one per line. If not
    /// given, a small built-in default blacklist is used.
    #[arg(long)]
    blacklist_file: Option<PathBuf>,

    /// How long a cached response stays valid, regardless of the TTLs
    /// carried by the records it contains.
    #[arg(long, default_value_t = 300)]
    cache_ttl_seconds: u64,

    /// Maximum number of distinct queries kept in the cache at once.
    #[arg(long, default_value_t = 512)]
    cache_size: usize,

    /// Maximum queries accepted from a single source per second.
    #[arg(long, default_value_t = 5)]
    rate_limit_per_second: u32,

    /// Maximum accepted size, in bytes, of an incoming UDP datagram.
    #[arg(long, default_value_t = 512)]
    max_message_size: usize,

    /// A root nameserver to start resolution from. Repeatable.
    #[arg(long, default_value = "198.41.0.4")]
    root_hint: Vec<Ipv4Addr>,

    /// Maximum recursion depth when resolving a referred nameserver's
    /// hostname to an address.
    #[arg(long, default_value_t = 8)]
    max_ns_resolution_depth: u32,
}

#[tokio::main]
async fn main() {
    begin_logging();

    let args = Args::parse();

    let blacklist = match &args.blacklist_file {
        Some(path) => match admission::load_blacklist_file(path) {
            Ok(blacklist) => blacklist,
            Err(error) => {
                tracing::error!(?error, path = %path.display(), "could not load blacklist file");
                std::process::exit(1);
            }
        },
        None => admission::default_blacklist(),
    };

    let admission = Arc::new(AdmissionControl::new(
        args.max_message_size,
        args.rate_limit_per_second,
        blacklist,
    ));
    let cache = SharedCache::new(Duration::from_secs(args.cache_ttl_seconds), args.cache_size);
    let config = Arc::new(ResolverConfig {
        root_hints: args.root_hint.clone(),
        per_query_timeout: Duration::from_secs(5),
        overall_timeout: Duration::from_secs(15),
        max_ns_resolution_depth: args.max_ns_resolution_depth,
    });

    info!(host = %args.host, port = args.port, "binding DNS UDP socket");
    let socket = match UdpSocket::bind(SocketAddr::from((args.host, args.port))).await {
        Ok(socket) => Arc::new(socket),
        Err(error) => {
            tracing::error!(?error, "could not bind DNS UDP socket");
            std::process::exit(1);
        }
    };

    tokio::spawn(prune_cache_task(cache.clone(), Arc::clone(&admission)));

    if let Err(error) = resolved::listen_udp(socket, cache, admission, config).await {
        tracing::error!(?error, "UDP listener terminated");
        std::process::exit(1);
    }
}

fn begin_logging() {
    use std::env;
    use tracing_subscriber::EnvFilter;

    let format = env::var("RUST_LOG_FORMAT").unwrap_or_default();
    let formats: HashSet<&str> = format.split(',').map(str::trim).collect();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(!formats.contains("no-ansi"))
        .with_target(false);

    if formats.contains("json") {
        builder.json().init();
    } else if formats.contains("compact") {
        builder.compact().init();
    } else if formats.contains("no-time") {
        builder.without_time().init();
    } else {
        builder.pretty().init();
    }
}

/// Sweep expired cache entries and stale rate-limit windows every five
/// minutes, matching the periodic-maintenance cadence a long-running
/// resolver needs so neither table just grows until the next lookup
/// or query happens to touch a stale key.
async fn prune_cache_task(cache: SharedCache, admission: Arc<AdmissionControl>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
    loop {
        interval.tick().await;
        let pruned = cache.prune();
        if pruned > 0 {
            debug!(pruned, remaining = cache.len(), "pruned expired cache entries");
        }

        let pruned_rate_limits = admission.prune();
        if pruned_rate_limits > 0 {
            debug!(pruned = pruned_rate_limits, "pruned stale rate limit windows");
        }
    }
}
