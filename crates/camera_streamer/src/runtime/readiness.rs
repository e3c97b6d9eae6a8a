//! Best-effort wait for the RTSP server to accept connections

use crate::camera::HostProbe;
use crate::config::{ReadinessMethod, ReadinessPolicy};

/// Result of the readiness gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Server accepted a connection on the given attempt
    Ready { attempts: u32 },
    /// Every attempt failed (or the gate is disabled); streaming proceeds anyway
    Unconfirmed { attempts: u32 },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

async fn check_once(host: &str, port: u16, policy: &ReadinessPolicy, probe: &dyn HostProbe) -> bool {
    match policy.method {
        ReadinessMethod::Tcp => probe.port_open(host, port, policy.timeout()).await,
        ReadinessMethod::Netcat => {
            let args = vec!["-z".to_string(), host.to_string(), port.to_string()];
            probe.command_succeeds("nc", &args, policy.timeout()).await
        }
    }
}

/// Poll `host:port` up to `policy.attempts` times
///
/// Sleeps `policy.interval()` between attempts, not after the last one.
pub async fn wait_for_server(
    host: &str,
    port: u16,
    policy: &ReadinessPolicy,
    probe: &dyn HostProbe,
) -> Readiness {
    if !policy.enabled {
        log::info!("RTSP server readiness check disabled");
        return Readiness::Unconfirmed { attempts: 0 };
    }

    log::info!("Waiting for RTSP server at {}:{}...", host, port);

    for attempt in 1..=policy.attempts {
        if check_once(host, port, policy, probe).await {
            log::info!("RTSP server is ready!");
            return Readiness::Ready { attempts: attempt };
        }

        log::debug!(
            "RTSP server not reachable (attempt {}/{})",
            attempt,
            policy.attempts
        );

        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval()).await;
        }
    }

    log::warn!("Could not verify RTSP server, proceeding anyway...");
    Readiness::Unconfirmed {
        attempts: policy.attempts,
    }
}
