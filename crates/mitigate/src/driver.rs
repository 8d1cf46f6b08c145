//! Abstract packet-filter capability. One concrete implementation shells
//! out to `iptables`/`arptables`; one is an in-memory test double. Both
//! implement the same contract so the mitigation controller never knows
//! which one it's driving.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;

use netsentry_core::error::NetsentryError;
use netsentry_core::pipeline::BoxFuture;
use netsentry_core::types::SerializableMac;

pub type RuleHandle = String;

/// Required operations, per the filter driver contract: idempotent chain
/// setup, idempotent IP/ARP drop install, rate-limit install, and removal.
pub trait PacketFilterDriver: Send + Sync {
    fn ensure_chain(&self) -> impl Future<Output = Result<(), NetsentryError>> + Send;

    fn install_ip_drop(&self, ip: IpAddr) -> impl Future<Output = Result<RuleHandle, NetsentryError>> + Send;

    fn install_arp_drop(
        &self,
        ip: Ipv4Addr,
        mac: SerializableMac,
    ) -> impl Future<Output = Result<RuleHandle, NetsentryError>> + Send;

    fn install_rate_limit(
        &self,
        ip: IpAddr,
        rate_pps: u32,
    ) -> impl Future<Output = Result<RuleHandle, NetsentryError>> + Send;

    /// Removing a handle that is no longer installed is not an error.
    fn remove(&self, handle: &RuleHandle) -> impl Future<Output = Result<(), NetsentryError>> + Send;

    fn list_active(&self) -> impl Future<Output = Result<Vec<RuleHandle>, NetsentryError>> + Send;
}

/// Object-safe counterpart, so the controller can hold `Arc<dyn
/// DynPacketFilterDriver>` regardless of which concrete driver is wired in.
pub trait DynPacketFilterDriver: Send + Sync {
    fn ensure_chain(&self) -> BoxFuture<'_, Result<(), NetsentryError>>;
    fn install_ip_drop(&self, ip: IpAddr) -> BoxFuture<'_, Result<RuleHandle, NetsentryError>>;
    fn install_arp_drop(&self, ip: Ipv4Addr, mac: SerializableMac) -> BoxFuture<'_, Result<RuleHandle, NetsentryError>>;
    fn install_rate_limit(&self, ip: IpAddr, rate_pps: u32) -> BoxFuture<'_, Result<RuleHandle, NetsentryError>>;
    fn remove<'a>(&'a self, handle: &'a RuleHandle) -> Pin<Box<dyn Future<Output = Result<(), NetsentryError>> + Send + 'a>>;
    fn list_active(&self) -> BoxFuture<'_, Result<Vec<RuleHandle>, NetsentryError>>;
}

impl<T: PacketFilterDriver> DynPacketFilterDriver for T {
    fn ensure_chain(&self) -> BoxFuture<'_, Result<(), NetsentryError>> {
        Box::pin(PacketFilterDriver::ensure_chain(self))
    }

    fn install_ip_drop(&self, ip: IpAddr) -> BoxFuture<'_, Result<RuleHandle, NetsentryError>> {
        Box::pin(PacketFilterDriver::install_ip_drop(self, ip))
    }

    fn install_arp_drop(&self, ip: Ipv4Addr, mac: SerializableMac) -> BoxFuture<'_, Result<RuleHandle, NetsentryError>> {
        Box::pin(PacketFilterDriver::install_arp_drop(self, ip, mac))
    }

    fn install_rate_limit(&self, ip: IpAddr, rate_pps: u32) -> BoxFuture<'_, Result<RuleHandle, NetsentryError>> {
        Box::pin(PacketFilterDriver::install_rate_limit(self, ip, rate_pps))
    }

    fn remove<'a>(&'a self, handle: &'a RuleHandle) -> Pin<Box<dyn Future<Output = Result<(), NetsentryError>> + Send + 'a>> {
        Box::pin(PacketFilterDriver::remove(self, handle))
    }

    fn list_active(&self) -> BoxFuture<'_, Result<Vec<RuleHandle>, NetsentryError>> {
        Box::pin(PacketFilterDriver::list_active(self))
    }
}
