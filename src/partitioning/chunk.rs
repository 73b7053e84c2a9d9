//! Growth chunks
//!
//! A chunk is a bounded pool of units (sectors of a free region, extents of a
//! volume group, bytes of a btrfs volume) shared by the requests placed in it.
//! Growth hands the pool out in proportion to each request's base, clamping
//! every request at its maximum and recycling what the clamp gives back.

use crate::disk::size::{sectors_to_size, size_to_sectors, Size};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkUnit {
    Sectors(u64),
    Extents(Size),
    Bytes,
}

impl ChunkUnit {
    pub fn to_size(self, units: u64) -> Size {
        match self {
            Self::Sectors(ss) => sectors_to_size(units, ss),
            Self::Extents(pe) => pe * units,
            Self::Bytes => Size::from_bytes(units),
        }
    }

    /// Whole units that fit in `size`.
    pub fn from_size(self, size: Size) -> u64 {
        match self {
            Self::Sectors(ss) => size_to_sectors(size, ss),
            Self::Extents(pe) => size / pe,
            Self::Bytes => size.bytes(),
        }
    }

    /// Units needed to hold `size`.
    pub fn from_size_up(self, size: Size) -> u64 {
        let bytes = self.to_size(1).bytes().max(1);
        size.bytes().div_ceil(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRequest {
    /// Index of the owning request in the caller's list.
    pub index: usize,
    pub name: String,
    pub base: u64,
    pub growth: u64,
    /// `None` means unbounded.
    pub max_growth: Option<u64>,
    pub done: bool,
    /// Reclaimed by a size set; excluded from further growth.
    pub skip: bool,
    pub percent: Option<u32>,
    /// First sector, for requests in a disk chunk.
    pub start: u64,
    /// Caps that do not depend on neighbouring growth.
    pub own_cap: Option<u64>,
    /// Last unit the request may reach, for disk chunks.
    pub end_limit: Option<u64>,
}

impl ChunkRequest {
    pub fn new(index: usize, name: impl Into<String>, base: u64, grow: bool) -> Self {
        Self {
            index,
            name: name.into(),
            base,
            growth: 0,
            max_growth: if grow { None } else { Some(0) },
            done: !grow,
            skip: false,
            percent: None,
            start: 0,
            own_cap: if grow { None } else { Some(0) },
            end_limit: None,
        }
    }

    /// Narrow the request's own cap.
    pub fn cap(&mut self, limit: u64) {
        self.own_cap = Some(self.own_cap.map_or(limit, |c| c.min(limit)));
        self.max_growth = self.own_cap;
    }

    pub fn total(&self) -> u64 {
        self.base + self.growth
    }

    fn active(&self) -> bool {
        !self.done && !self.skip
    }
}

impl fmt::Display for ChunkRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} base={} growth={} max_growth={} done={}",
            self.name,
            self.base,
            self.growth,
            self.max_growth.map_or("none".to_string(), |m| m.to_string()),
            self.done
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub name: String,
    pub unit: ChunkUnit,
    pub length: u64,
    pub pool: u64,
    pub requests: Vec<ChunkRequest>,
}

impl Chunk {
    pub fn new(name: impl Into<String>, unit: ChunkUnit, length: u64) -> Self {
        Self {
            name: name.into(),
            unit,
            length,
            pool: length,
            requests: Vec::new(),
        }
    }

    pub fn add_request(&mut self, req: ChunkRequest) {
        self.pool = self.pool.saturating_sub(req.base);
        self.requests.push(req);
    }

    /// Sum of the requests' base units.
    pub fn committed(&self) -> u64 {
        self.requests.iter().map(|r| r.base).sum()
    }

    pub fn is_overcommitted(&self) -> bool {
        self.committed() > self.length
    }

    pub fn all_done(&self) -> bool {
        self.requests.iter().all(|r| !r.active())
    }

    pub fn find(&self, index: usize) -> Option<usize> {
        self.requests.iter().position(|r| r.index == index)
    }

    pub fn to_size(&self, units: u64) -> Size {
        self.unit.to_size(units)
    }

    /// Recompute caps that depend on neighbouring growth.
    ///
    /// Growing a request shifts every later request in the same chunk, so a
    /// request is limited both by its own end limit and by the slack left to
    /// any later request that has one.
    fn refresh_max_growth(&mut self) {
        let slack: Vec<Option<(u64, i128)>> = self
            .requests
            .iter()
            .map(|q| {
                let limit = q.end_limit?;
                let earlier: u64 = self
                    .requests
                    .iter()
                    .filter(|r| r.start < q.start)
                    .map(|r| r.growth)
                    .sum();
                let end = q.start + earlier + q.base.saturating_sub(1) + q.growth;
                Some((q.start, limit as i128 - end as i128))
            })
            .collect();

        for (i, req) in self.requests.iter_mut().enumerate() {
            let mut cap = req.own_cap.map(|c| c as i128);
            for (j, entry) in slack.iter().enumerate() {
                let Some((start, room)) = entry else { continue };
                if j == i || *start > req.start {
                    let allowed = req.growth as i128 + room;
                    cap = Some(cap.map_or(allowed, |c| c.min(allowed)));
                }
            }
            req.max_growth = cap.map(|c| c.max(0) as u64);
        }
    }

    /// Clamp request `pos` at its max, refunding the excess to the pool.
    fn trim_over_grown(&mut self, pos: usize) {
        let req = &mut self.requests[pos];
        let Some(max) = req.max_growth else { return };
        if req.growth >= max {
            let excess = req.growth - max;
            if excess > 0 {
                debug!("{}: trimming {} units over its max", req.name, excess);
            }
            self.pool += excess;
            req.growth = max;
            req.done = true;
        }
    }

    /// Distribute the pool over the growable requests.
    pub fn grow_requests(&mut self) {
        self.refresh_max_growth();
        for req in &mut self.requests {
            if req.max_growth == Some(0) {
                req.done = true;
            }
        }

        let length = self.length;
        for i in 0..self.requests.len() {
            let req = &mut self.requests[i];
            let Some(pct) = req.percent else { continue };
            if !req.active() {
                continue;
            }
            let share = ((length as u128 * pct as u128) / 100) as u64;
            let share = share.min(self.pool);
            req.growth += share;
            req.done = true;
            self.pool -= share;
            debug!("{}: {}% of {} is {} units", req.name, pct, self.name, share);
        }

        let mut last_pool = 0;
        while self.pool > 0 && !self.all_done() && last_pool != self.pool {
            last_pool = self.pool;
            let growable_base: u64 = self
                .requests
                .iter()
                .filter(|r| r.active())
                .map(|r| r.base)
                .sum();
            if growable_base == 0 {
                break;
            }
            for i in 0..self.requests.len() {
                if !self.requests[i].active() {
                    continue;
                }
                let base = self.requests[i].base;
                let share = ((base as u128 * last_pool as u128) / growable_base as u128) as u64;
                let share = share.min(self.pool);
                self.requests[i].growth += share;
                self.pool -= share;
                self.refresh_max_growth();
                self.trim_over_grown(i);
            }
            debug!(
                "{}: growth pass left {} of {} units in the pool",
                self.name, self.pool, self.length
            );
        }

        // whatever rounding left behind goes to the first request that can take it
        while self.pool > 0 {
            let Some(i) = self.requests.iter().position(|r| r.active()) else {
                break;
            };
            self.requests[i].growth += self.pool;
            self.pool = 0;
            self.refresh_max_growth();
            self.trim_over_grown(i);
        }

        for req in &self.requests {
            debug!("{}: {}", self.name, req);
        }
    }

    /// Take `amount` units back from request `pos` and keep it from regrowing.
    pub fn reclaim(&mut self, pos: usize, amount: u64) {
        let req = &mut self.requests[pos];
        let amount = amount.min(req.growth);
        req.growth -= amount;
        req.skip = true;
        self.pool += amount;
        debug!("{}: reclaimed {} units from {}", self.name, amount, req.name);
    }
}
