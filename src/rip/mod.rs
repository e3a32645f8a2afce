//! Representative RIP output processing: route walker, packet assembly and
//! pacing, with the standard horizon policies.

pub mod output;
pub mod packet_queue;
pub mod route_db;

pub use output::{FillOutcome, Horizon, OutputTable};
pub use packet_queue::{MAX_ENTRIES_PER_PACKET, PacketQueue, RipPacket, RipPacketEntry};
pub use route_db::{RIP_INFINITY, RipRoute, RouteDb};
