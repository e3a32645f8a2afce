//! Output pacing: walk the route DB, fill one packet per tick, rest for
//! the interpacket gap.
//!
//! The fill step is synchronous and owns no timer; the async pacer wraps
//! it. Between ticks the walker is paused, which extends the deletion
//! timer of the route it points at so a withdraw cannot retire out from
//! under a suspended walk.

use std::time::Duration;

use tracing::trace;

use crate::net::{Address, IpNet};
use crate::rip::packet_queue::{PacketQueue, RipPacket, RipPacketEntry};
use crate::rip::route_db::{RIP_INFINITY, RouteDb};

/// What a port re-advertises on the interface a route was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Horizon {
    /// Advertise everything unchanged.
    None,
    /// Never re-advertise on the learning interface.
    #[default]
    Split,
    /// Re-advertise on the learning interface at infinity.
    PoisonReverse,
}

impl Horizon {
    /// Cost to advertise, or `None` to omit the route entirely.
    #[must_use]
    pub fn apply(self, learned_on_out_vif: bool, cost: u32) -> Option<u32> {
        if !learned_on_out_vif {
            return Some(cost);
        }
        match self {
            Horizon::None => Some(cost),
            Horizon::Split => None,
            Horizon::PoisonReverse => Some(RIP_INFINITY),
        }
    }
}

/// Outcome of one fill tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// A packet was queued and more routes remain; re-arm after the gap.
    MoreRemaining,
    /// The walk is complete (a final packet may or may not have been
    /// queued).
    Exhausted,
}

/// Paces response packets out of a route DB toward one neighbor.
pub struct OutputTable<A: Address> {
    dest: A,
    dest_port: u16,
    /// Interface this output transmits on.
    out_vif: String,
    horizon: Horizon,
    interpacket_gap: Duration,
    queue: PacketQueue<A>,
    /// Next prefix to visit; `None` means the walk is not in progress.
    position: Option<IpNet<A>>,
    walking: bool,
    packets_sent: u64,
}

impl<A: Address> OutputTable<A> {
    #[must_use]
    pub fn new(
        dest: A,
        dest_port: u16,
        out_vif: impl Into<String>,
        horizon: Horizon,
        interpacket_gap: Duration,
        max_queued_packets: usize,
    ) -> Self {
        Self {
            dest,
            dest_port,
            out_vif: out_vif.into(),
            horizon,
            interpacket_gap,
            queue: PacketQueue::new(max_queued_packets),
            position: None,
            walking: false,
            packets_sent: 0,
        }
    }

    #[must_use]
    pub fn interpacket_gap(&self) -> Duration {
        self.interpacket_gap
    }

    #[must_use]
    pub fn running(&self) -> bool {
        self.walking
    }

    #[must_use]
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    #[must_use]
    pub fn queue(&mut self) -> &mut PacketQueue<A> {
        &mut self.queue
    }

    /// Begins (or restarts) a walk from the top of the table.
    pub fn start(&mut self) {
        self.position = None;
        self.walking = true;
    }

    pub fn stop(&mut self) {
        self.walking = false;
        self.position = None;
    }

    /// Fills at most one packet from the current walk position and queues
    /// it. The caller re-arms after the interpacket gap while routes
    /// remain, calling [`OutputTable::pause`] in between.
    pub fn fill_next_packet(&mut self, db: &RouteDb<A>) -> FillOutcome {
        if !self.walking {
            return FillOutcome::Exhausted;
        }
        let mut packet = RipPacket::new(self.dest, self.dest_port);
        let mut cursor = db.next_from(self.position).map(|r| r.net);

        while let Some(net) = cursor {
            let Some(route) = db.get(&net) else {
                cursor = db.next_after(net).map(|r| r.net);
                continue;
            };
            if let Some(cost) = self
                .horizon
                .apply(route.vif == self.out_vif, route.cost.min(RIP_INFINITY))
            {
                packet.entries.push(RipPacketEntry {
                    net: route.net,
                    next_hop: route.next_hop,
                    cost,
                    tag: route.tag,
                });
            }
            cursor = db.next_after(net).map(|r| r.net);
            if packet.is_full() {
                break;
            }
        }

        if !packet.entries.is_empty() {
            trace!(entries = packet.entries.len(), "queueing response packet");
            self.queue.enqueue(packet);
            self.packets_sent += 1;
        }

        match cursor {
            Some(next) => {
                self.position = Some(next);
                FillOutcome::MoreRemaining
            }
            None => {
                self.walking = false;
                self.position = None;
                FillOutcome::Exhausted
            }
        }
    }

    /// Parks the walker for the interpacket gap: the route it points at
    /// gets its deletion timer pushed out so it is still there on resume.
    pub fn pause(&self, db: &mut RouteDb<A>) {
        if let Some(net) = self.position {
            db.extend_deletion(&net, self.interpacket_gap * 2);
        }
    }

    /// Async pacer: runs fill ticks separated by the interpacket gap until
    /// the walk completes. `db` is locked only inside each tick.
    pub async fn pace(&mut self, db: &std::sync::Mutex<RouteDb<A>>) {
        self.start();
        loop {
            let outcome = {
                let mut db = db.lock().expect("route db lock");
                let outcome = self.fill_next_packet(&db);
                if outcome == FillOutcome::MoreRemaining {
                    self.pause(&mut db);
                }
                outcome
            };
            match outcome {
                FillOutcome::Exhausted => break,
                FillOutcome::MoreRemaining => tokio::time::sleep(self.interpacket_gap).await,
            }
        }
    }
}
