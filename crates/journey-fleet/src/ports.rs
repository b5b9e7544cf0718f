//! Loopback port leases for workers.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard, PoisonError};

use journey_client::now_wallclock_ms;

use crate::error::FleetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLease {
    pub port: u16,
    pub owner_service_name: String,
    pub leased_at: u64,
}

#[derive(Debug)]
struct Leases {
    held: BTreeMap<u16, PortLease>,
    /// Scan start for the next lease; moves to each released port.
    cursor: u16,
}

/// Hands out distinct ports from a fixed range. Safe to share across tasks.
#[derive(Debug)]
pub struct PortLeaseRegistry {
    range: RangeInclusive<u16>,
    inner: Mutex<Leases>,
}

impl PortLeaseRegistry {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        let cursor = *range.start();
        Self {
            range,
            inner: Mutex::new(Leases {
                held: BTreeMap::new(),
                cursor,
            }),
        }
    }

    pub fn range(&self) -> &RangeInclusive<u16> {
        &self.range
    }

    fn lock(&self) -> MutexGuard<'_, Leases> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First free port at or after the last released one, wrapping once.
    pub fn lease(&self, owner: &str) -> Result<u16, FleetError> {
        let (start, end) = (*self.range.start(), *self.range.end());
        if start > end {
            return Err(FleetError::Exhausted { start, end });
        }
        let size = u32::from(end) - u32::from(start) + 1;
        let mut leases = self.lock();
        let offset = u32::from(leases.cursor.clamp(start, end)) - u32::from(start);
        for i in 0..size {
            let port = (u32::from(start) + (offset + i) % size) as u16;
            if !leases.held.contains_key(&port) {
                leases.held.insert(
                    port,
                    PortLease {
                        port,
                        owner_service_name: owner.to_string(),
                        leased_at: now_wallclock_ms(),
                    },
                );
                return Ok(port);
            }
        }
        Err(FleetError::Exhausted { start, end })
    }

    pub fn release(&self, port: u16) -> Option<PortLease> {
        let mut leases = self.lock();
        let lease = leases.held.remove(&port);
        if lease.is_some() {
            leases.cursor = port;
        }
        lease
    }

    pub fn leases(&self) -> Vec<PortLease> {
        self.lock().held.values().cloned().collect()
    }

    pub fn leased_count(&self) -> usize {
        self.lock().held.len()
    }
}
