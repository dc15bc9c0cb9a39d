use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::debug;

#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Awaited right before user-triggered network work.
    async fn is_online(&self) -> bool;
}

/// `[network]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `host:port` that must accept a TCP connection for us to be online.
    pub probe_address: String,
    pub probe_timeout_ms: u64,
    /// Per-request HTTP timeout for feed fetches.
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_address: "1.1.1.1:443".to_string(),
            probe_timeout_ms: 1500,
            request_timeout_secs: 10,
        }
    }
}

/// Online when a TCP connection to the probe address succeeds.
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            address: config.probe_address.clone(),
            timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }

    async fn connect(&self) -> std::io::Result<()> {
        let mut last_err = None;
        for addr in lookup_host(self.address.as_str()).await? {
            match TcpStream::connect(addr).await {
                Ok(_) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
        }))
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_online(&self) -> bool {
        match timeout(self.timeout, self.connect()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("No connection to {}: {}", self.address, e);
                false
            }
            Err(_) => {
                debug!("Probe of {} timed out after {:?}", self.address, self.timeout);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    use tokio::net::TcpListener;

    pub struct FixedConnectivity(pub AtomicBool);

    impl FixedConnectivity {
        pub fn new(online: bool) -> Self {
            Self(AtomicBool::new(online))
        }
    }

    #[async_trait]
    impl Connectivity for FixedConnectivity {
        async fn is_online(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn tcp_check(address: String, timeout_ms: u64) -> TcpProbe {
        TcpProbe::new(&NetworkConfig {
            probe_address: address,
            probe_timeout_ms: timeout_ms,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_online_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        assert!(tcp_check(address, 200).is_online().await);
    }

    #[tokio::test]
    async fn test_offline_on_closed_port() {
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        assert!(!tcp_check(address, 200).is_online().await);
    }

    #[tokio::test]
    async fn test_offline_on_unresolvable_address() {
        assert!(!tcp_check("not an address".into(), 200).is_online().await);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_slow_connect_does_not_stall_runtime() {
        // TEST-NET-1 is never routed, so the connect hangs until the timeout.
        let slow = tcp_check("192.0.2.1:9".into(), 300);
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let started = Instant::now();
        let online = slow.is_online().await;
        ticker.abort();

        if !online && started.elapsed() >= Duration::from_millis(250) {
            assert!(ticks.load(Ordering::SeqCst) > 5);
        }
    }
}
