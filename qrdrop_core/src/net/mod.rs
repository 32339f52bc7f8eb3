//! Local network plumbing: free-port selection and LAN address discovery.

pub mod address;
pub mod port;

pub use address::{all_local_ipv4_addresses, local_ipv4, pick_lan_address, resolve_advertise_host};
pub use port::{PortAllocator, allocate_port, is_port_in_use};
