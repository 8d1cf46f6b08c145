//! Concrete driver shelling out to `iptables`/`arptables`. Idempotent:
//! every install first checks whether an equivalent rule already exists
//! (`-C`) before inserting (`-I`), so a second call for the same target is
//! observable as success and leaves a single rule.

use std::net::{IpAddr, Ipv4Addr};

use tokio::process::Command;
use tokio::sync::Mutex;

use netsentry_core::error::{MitigationError, NetsentryError};
use netsentry_core::types::SerializableMac;

use crate::driver::{PacketFilterDriver, RuleHandle};

const CHAIN_NAME: &str = "NETSENTRY";
const ARP_CHAIN_NAME: &str = "NETSENTRY-ARP";

pub struct IptablesDriver {
    iptables_bin: String,
    arptables_bin: String,
    /// Handle -> rule spec, so `remove` knows the exact arguments to
    /// delete without needing to query iptables for them.
    installed: Mutex<std::collections::HashMap<RuleHandle, Vec<String>>>,
}

impl IptablesDriver {
    pub fn new() -> Self {
        Self::with_binaries("iptables", "arptables")
    }

    pub fn with_binaries(iptables_bin: impl Into<String>, arptables_bin: impl Into<String>) -> Self {
        Self {
            iptables_bin: iptables_bin.into(),
            arptables_bin: arptables_bin.into(),
            installed: Mutex::new(std::collections::HashMap::new()),
        }
    }

    async fn run(&self, bin: &str, args: &[String]) -> Result<bool, NetsentryError> {
        match Command::new(bin).args(args).output().await {
            Ok(output) => Ok(output.status.success()),
            Err(e) => {
                tracing::warn!(bin, error = %e, "packet-filter command failed to spawn");
                Err(MitigationError::DriverCommandFailed {
                    command: format!("{bin} {}", args.join(" ")),
                    exit_code: -1,
                }
                .into())
            }
        }
    }
}

impl Default for IptablesDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketFilterDriver for IptablesDriver {
    async fn ensure_chain(&self) -> Result<(), NetsentryError> {
        for (bin, chain, hook) in [
            (self.iptables_bin.as_str(), CHAIN_NAME, "INPUT"),
            (self.iptables_bin.as_str(), CHAIN_NAME, "FORWARD"),
        ] {
            let exists = self.run(bin, &["-L".to_owned(), chain.to_owned(), "-n".to_owned()]).await.unwrap_or(false);
            if !exists {
                self.run(bin, &["-N".to_owned(), chain.to_owned()]).await?;
            }
            let linked = self
                .run(
                    bin,
                    &["-C".to_owned(), hook.to_owned(), "-j".to_owned(), chain.to_owned()],
                )
                .await
                .unwrap_or(false);
            if !linked {
                self.run(bin, &["-I".to_owned(), hook.to_owned(), "-j".to_owned(), chain.to_owned()]).await?;
            }
        }

        let arp_exists = self
            .run(&self.arptables_bin, &["-L".to_owned(), ARP_CHAIN_NAME.to_owned()])
            .await
            .unwrap_or(false);
        if !arp_exists {
            self.run(&self.arptables_bin, &["-N".to_owned(), ARP_CHAIN_NAME.to_owned()]).await?;
            self.run(
                &self.arptables_bin,
                &["-I".to_owned(), "INPUT".to_owned(), "-j".to_owned(), ARP_CHAIN_NAME.to_owned()],
            )
            .await?;
        }
        Ok(())
    }

    async fn install_ip_drop(&self, ip: IpAddr) -> Result<RuleHandle, NetsentryError> {
        let args = vec!["-s".to_owned(), ip.to_string(), "-j".to_owned(), "DROP".to_owned()];
        let mut check_args = vec!["-C".to_owned(), CHAIN_NAME.to_owned()];
        check_args.extend(args.clone());
        let already_installed = self.run(&self.iptables_bin, &check_args).await.unwrap_or(false);

        if !already_installed {
            let mut insert_args = vec!["-I".to_owned(), CHAIN_NAME.to_owned()];
            insert_args.extend(args.clone());
            self.run(&self.iptables_bin, &insert_args).await?;
        }

        let handle = uuid::Uuid::new_v4().to_string();
        let mut full_args = vec![CHAIN_NAME.to_owned()];
        full_args.extend(args);
        self.installed.lock().await.insert(handle.clone(), full_args);
        Ok(handle)
    }

    async fn install_arp_drop(&self, ip: Ipv4Addr, mac: SerializableMac) -> Result<RuleHandle, NetsentryError> {
        let args = vec![
            "--source-ip".to_owned(),
            ip.to_string(),
            "--source-mac".to_owned(),
            mac.to_string(),
            "-j".to_owned(),
            "DROP".to_owned(),
        ];
        let mut check_args = vec!["-C".to_owned(), ARP_CHAIN_NAME.to_owned()];
        check_args.extend(args.clone());
        let already_installed = self.run(&self.arptables_bin, &check_args).await.unwrap_or(false);

        if !already_installed {
            let mut insert_args = vec!["-I".to_owned(), ARP_CHAIN_NAME.to_owned()];
            insert_args.extend(args.clone());
            self.run(&self.arptables_bin, &insert_args).await?;
        }

        let handle = uuid::Uuid::new_v4().to_string();
        let mut full_args = vec![ARP_CHAIN_NAME.to_owned()];
        full_args.extend(args);
        self.installed.lock().await.insert(handle.clone(), full_args);
        Ok(handle)
    }

    async fn install_rate_limit(&self, ip: IpAddr, rate_pps: u32) -> Result<RuleHandle, NetsentryError> {
        let accept_args = vec![
            "-s".to_owned(),
            ip.to_string(),
            "-m".to_owned(),
            "limit".to_owned(),
            "--limit".to_owned(),
            format!("{rate_pps}/sec"),
            "-j".to_owned(),
            "ACCEPT".to_owned(),
        ];
        let mut insert_accept = vec!["-I".to_owned(), CHAIN_NAME.to_owned()];
        insert_accept.extend(accept_args.clone());
        self.run(&self.iptables_bin, &insert_accept).await?;

        let drop_args = vec!["-s".to_owned(), ip.to_string(), "-j".to_owned(), "DROP".to_owned()];
        let mut insert_drop = vec!["-I".to_owned(), CHAIN_NAME.to_owned()];
        insert_drop.extend(drop_args.clone());
        self.run(&self.iptables_bin, &insert_drop).await?;

        let handle = uuid::Uuid::new_v4().to_string();
        let mut full_args = vec![CHAIN_NAME.to_owned()];
        full_args.extend(accept_args);
        self.installed.lock().await.insert(handle.clone(), full_args);
        Ok(handle)
    }

    async fn remove(&self, handle: &RuleHandle) -> Result<(), NetsentryError> {
        let mut guard = self.installed.lock().await;
        let Some(args) = guard.remove(handle) else {
            return Ok(());
        };
        drop(guard);

        let bin = if args.first().map(String::as_str) == Some(ARP_CHAIN_NAME) {
            &self.arptables_bin
        } else {
            &self.iptables_bin
        };
        let mut delete_args = vec!["-D".to_owned()];
        delete_args.extend(args);
        // Missing rule is not an error: the caller only needs "gone", not
        // "was present".
        let _ = self.run(bin, &delete_args).await;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<RuleHandle>, NetsentryError> {
        Ok(self.installed.lock().await.keys().cloned().collect())
    }
}
