pub mod compute_node;
pub mod fabric;
pub mod switch;
pub mod switch_port;

pub use compute_node::{ComputeNode, NodePortPath};
pub use fabric::Fabric;
pub use switch::Switch;
pub use switch_port::{SwitchPort, SwitchPortUpsert};
