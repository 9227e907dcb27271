//! Leader election over a `coordination.k8s.io/v1` Lease. Only the holder runs
//! the controller; a holder that cannot renew within the lease duration exits.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;
use tracing::{debug, info, warn};

pub const LEASE_NAME: &str = "99748453.cnvrg.io";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseConfig {
    pub name: String,
    /// Defaults to the client's namespace
    pub namespace: Option<String>,
    pub ttl: Duration,
    pub renew_every: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { name: LEASE_NAME.to_string(), namespace: None, ttl: Duration::from_secs(15), renew_every: Duration::from_secs(5) }
    }
}

/// Spec to write for `identity`, or `None` while another holder is live.
pub(crate) fn claim(current: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>, ttl: Duration) -> Option<LeaseSpec> {
    let ours = current.and_then(|l| l.holder_identity.as_deref()) == Some(identity);
    if let Some(l) = current {
        if !ours && is_live(l, now) {
            return None;
        }
    }
    let mut next = current.cloned().unwrap_or_default();
    if !ours {
        next.holder_identity = Some(identity.to_string());
        next.acquire_time = Some(MicroTime(now));
        next.lease_transitions = Some(current.and_then(|l| l.lease_transitions).map_or(0, |t| t + 1));
    }
    next.renew_time = Some(MicroTime(now));
    next.lease_duration_seconds = Some(i32::try_from(ttl.as_secs()).unwrap_or(i32::MAX));
    Some(next)
}

fn is_live(lease: &LeaseSpec, now: DateTime<Utc>) -> bool {
    let (Some(holder), Some(MicroTime(renewed)), Some(secs)) = (&lease.holder_identity, &lease.renew_time, lease.lease_duration_seconds)
    else {
        return false;
    };
    !holder.is_empty() && *renewed + chrono::Duration::seconds(i64::from(secs)) > now
}

fn identity() -> String {
    let host = std::env::var("POD_NAME").or_else(|_| std::env::var("HOSTNAME")).unwrap_or_else(|_| "cnvrg-operator".to_string());
    format!("{host}_{}", uuid::Uuid::new_v4().simple())
}

pub struct LeaderElector {
    api: Api<Lease>,
    identity: String,
    cfg: LeaseConfig,
}

impl LeaderElector {
    pub fn new(client: Client, cfg: LeaseConfig) -> Self {
        let ns = cfg.namespace.clone().unwrap_or_else(|| client.default_namespace().to_string());
        Self { api: Api::namespaced(client, &ns), identity: identity(), cfg }
    }

    /// One acquire-or-renew attempt; true when we hold the lease afterwards.
    async fn try_hold(&self) -> Result<bool, kube::Error> {
        let current = self.api.get_opt(&self.cfg.name).await?;
        let Some(spec) = claim(current.as_ref().and_then(|l| l.spec.as_ref()), &self.identity, Utc::now(), self.cfg.ttl) else {
            return Ok(false);
        };
        let pp = PostParams::default();
        let written = match current {
            Some(mut lease) => {
                lease.spec = Some(spec);
                self.api.replace(&self.cfg.name, &pp, &lease).await
            }
            None => {
                let lease = Lease { metadata: ObjectMeta { name: Some(self.cfg.name.clone()), ..Default::default() }, spec: Some(spec) };
                self.api.create(&pp, &lease).await
            }
        };
        match written {
            Ok(_) => Ok(true),
            // another candidate wrote first
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Blocks until this replica holds the lease.
    pub async fn acquire(&self) {
        loop {
            match self.try_hold().await {
                Ok(true) => {
                    info!(lease = %self.cfg.name, identity = %self.identity, "acquired leadership");
                    return;
                }
                Ok(false) => debug!(lease = %self.cfg.name, "lease held elsewhere; waiting"),
                Err(e) => warn!(lease = %self.cfg.name, error = %e, "lease acquire failed"),
            }
            tokio::time::sleep(self.cfg.renew_every).await;
        }
    }

    /// Renews until leadership is lost; only ever returns an error.
    pub async fn hold(&self) -> Result<()> {
        let mut renewed = Instant::now();
        loop {
            tokio::time::sleep(self.cfg.renew_every).await;
            match self.try_hold().await {
                Ok(true) => renewed = Instant::now(),
                Ok(false) => bail!("lease {} taken by another holder", self.cfg.name),
                Err(e) => {
                    warn!(lease = %self.cfg.name, error = %e, "lease renewal failed");
                    if renewed.elapsed() >= self.cfg.ttl {
                        bail!("lease {} not renewed within {:?}", self.cfg.name, self.cfg.ttl);
                    }
                }
            }
        }
    }
}
