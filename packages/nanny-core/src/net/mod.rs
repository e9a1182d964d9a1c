//! The NRL21 UDP session: dial, heartbeat, receive loop, and the inbound
//! packet router.

pub mod inbound;
pub mod session;
