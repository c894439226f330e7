//! Command forwarding policy
//!
//! Decides which frames may cross the boundary to a forwarding peer.

pub mod allow_list;

pub use allow_list::{
    is_allowed, ForwardingAllowList, ForwardingDefaults, ForwardingPolicy, DEFAULT_FORWARDED_CALLS,
    DEFAULT_FORWARDED_MESSAGES,
};
