//! Packet-filter driver abstraction, the mitigation controller that
//! reconciles open threats against it, and the expiry sweeper that tears
//! blocks back down.

pub mod controller;
pub mod driver;
pub mod iptables_driver;
pub mod mock_driver;
pub mod sweeper;
