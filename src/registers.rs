use std::{iter::FusedIterator, ops::Range, slice};

use thiserror::Error;

pub type Address = u32;

/// Which Modbus function a connection type reads its registers with.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum RegisterType {
    Input,
    Holding,
}

/// Half-open block `[start, end)` of consecutively addressed registers.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct AddressInterval {
    pub start: Address,
    pub end: Address,
}

impl AddressInterval {
    pub const fn new(start: Address, end: Address) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end
    }
}

/// Every register block a model exposes over one connection type.
///
/// Intervals are kept exactly in the order they were supplied. Nothing is sorted or merged:
/// two numerically adjacent blocks are still read separately.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct AddressRangeSet {
    intervals: Vec<AddressInterval>,
}

impl AddressRangeSet {
    pub fn new(intervals: impl IntoIterator<Item = (Address, Address)>) -> Self {
        Self {
            intervals: intervals
                .into_iter()
                .map(|(start, end)| AddressInterval::new(start, end))
                .collect(),
        }
    }

    pub fn intervals(&self) -> impl Iterator<Item = AddressInterval> + Clone + '_ {
        self.intervals.iter().copied()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.intervals.iter().any(|interval| interval.contains(address))
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct ReadOperation {
    pub start: Address,
    pub count: u32,
}

impl ReadOperation {
    pub fn end(&self) -> Address {
        self.start + self.count
    }

    pub fn addresses(&self) -> Range<Address> {
        self.start..self.end()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("maximum read burst must be at least 1 register, got {0}")]
    BurstTooSmall(u32),
}

/// Splits every interval of `ranges` into reads of at most `max_burst` registers.
///
/// The returned plan is lazy and can be cloned to walk it again.
pub fn plan(ranges: &AddressRangeSet, max_burst: u32) -> Result<ReadPlan<'_>, PlanError> {
    if max_burst == 0 {
        return Err(PlanError::BurstTooSmall(max_burst));
    }

    Ok(ReadPlan {
        intervals: ranges.intervals.iter(),
        cursor: None,
        max_burst,
    })
}

#[derive(Debug, Clone)]
pub struct ReadPlan<'a> {
    intervals: slice::Iter<'a, AddressInterval>,
    cursor: Option<(Address, Address)>,
    max_burst: u32,
}

impl Iterator for ReadPlan<'_> {
    type Item = ReadOperation;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.cursor {
                Some((cursor, end)) if cursor < end => {
                    let count = self.max_burst.min(end - cursor);
                    self.cursor = Some((cursor + count, end));
                    return Some(ReadOperation { start: cursor, count });
                },
                _ => {
                    let interval = self.intervals.next()?;
                    self.cursor = Some((interval.start, interval.end));
                },
            }
        }
    }
}

impl FusedIterator for ReadPlan<'_> {}
