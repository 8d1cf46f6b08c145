//! In-memory test double: no subprocess, no kernel state, just a map of
//! installed rules. Used by the controller/sweeper unit tests and by
//! anything else exercising mitigation logic without a real firewall.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use tokio::sync::Mutex;

use netsentry_core::error::NetsentryError;
use netsentry_core::types::SerializableMac;

use crate::driver::{PacketFilterDriver, RuleHandle};

#[derive(Debug, Clone)]
pub enum InstalledRule {
    IpDrop(IpAddr),
    ArpDrop(Ipv4Addr, SerializableMac),
    RateLimit(IpAddr, u32),
}

#[derive(Default)]
pub struct MockDriver {
    rules: Mutex<HashMap<RuleHandle, InstalledRule>>,
    chain_ensured: Mutex<bool>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rule_for(&self, handle: &RuleHandle) -> Option<InstalledRule> {
        self.rules.lock().await.get(handle).cloned()
    }

    pub async fn installed_ips(&self) -> Vec<IpAddr> {
        self.rules
            .lock()
            .await
            .values()
            .filter_map(|r| match r {
                InstalledRule::IpDrop(ip) | InstalledRule::RateLimit(ip, _) => Some(*ip),
                InstalledRule::ArpDrop(ip, _) => Some(IpAddr::V4(*ip)),
            })
            .collect()
    }
}

impl PacketFilterDriver for MockDriver {
    async fn ensure_chain(&self) -> Result<(), NetsentryError> {
        *self.chain_ensured.lock().await = true;
        Ok(())
    }

    async fn install_ip_drop(&self, ip: IpAddr) -> Result<RuleHandle, NetsentryError> {
        let mut guard = self.rules.lock().await;
        if let Some((handle, _)) = guard.iter().find(|(_, r)| matches!(r, InstalledRule::IpDrop(existing) if *existing == ip)) {
            return Ok(handle.clone());
        }
        let handle = uuid::Uuid::new_v4().to_string();
        guard.insert(handle.clone(), InstalledRule::IpDrop(ip));
        Ok(handle)
    }

    async fn install_arp_drop(&self, ip: Ipv4Addr, mac: SerializableMac) -> Result<RuleHandle, NetsentryError> {
        let mut guard = self.rules.lock().await;
        if let Some((handle, _)) =
            guard.iter().find(|(_, r)| matches!(r, InstalledRule::ArpDrop(eip, emac) if *eip == ip && *emac == mac))
        {
            return Ok(handle.clone());
        }
        let handle = uuid::Uuid::new_v4().to_string();
        guard.insert(handle.clone(), InstalledRule::ArpDrop(ip, mac));
        Ok(handle)
    }

    async fn install_rate_limit(&self, ip: IpAddr, rate_pps: u32) -> Result<RuleHandle, NetsentryError> {
        let handle = uuid::Uuid::new_v4().to_string();
        self.rules.lock().await.insert(handle.clone(), InstalledRule::RateLimit(ip, rate_pps));
        Ok(handle)
    }

    async fn remove(&self, handle: &RuleHandle) -> Result<(), NetsentryError> {
        self.rules.lock().await.remove(handle);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<RuleHandle>, NetsentryError> {
        Ok(self.rules.lock().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_ip_drop_is_idempotent() {
        let driver = MockDriver::new();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let a = driver.install_ip_drop(ip).await.unwrap();
        let b = driver.install_ip_drop(ip).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(driver.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_missing_handle_is_not_an_error() {
        let driver = MockDriver::new();
        assert!(driver.remove(&"nonexistent".to_owned()).await.is_ok());
    }
}
