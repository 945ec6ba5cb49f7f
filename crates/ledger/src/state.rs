//! The per-symbol trade state machine.
//!
//! `TradeState::transition` is pure: it maps (state, signal) onto the entries
//! to record and the next state. `TradeState::step` is the checker every
//! recorded entry must pass, both for live transitions and for replaying a
//! persisted log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{EntryKind, Error, LedgerEntry, PositionSide, PositionStatus, Result, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeState {
    /// Number of the most recently opened order; 0 until the first open.
    pub order_number: u64,
    /// `None` while flat.
    pub position: Option<PositionSide>,
}

/// A ledger entry before it is stamped with symbol and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEntry {
    pub order_number: u64,
    pub signal: Signal,
    pub status: PositionStatus,
    pub kind: EntryKind,
}

impl PendingEntry {
    fn open(order_number: u64, signal: Signal) -> Self {
        Self {
            order_number,
            signal,
            status: PositionStatus::Open,
            kind: EntryKind::Open,
        }
    }

    fn close(order_number: u64, signal: Signal) -> Self {
        Self {
            order_number,
            signal,
            status: PositionStatus::Closed,
            kind: EntryKind::Close,
        }
    }

    fn mark(order_number: u64, signal: Signal) -> Self {
        Self {
            order_number,
            signal,
            status: PositionStatus::Open,
            kind: EntryKind::Mark,
        }
    }

    pub fn stamp(&self, symbol: &str, timestamp: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            symbol: symbol.to_string(),
            order_number: self.order_number,
            signal: self.signal,
            status: self.status,
            kind: self.kind,
            timestamp,
        }
    }
}

impl From<&LedgerEntry> for PendingEntry {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            order_number: entry.order_number,
            signal: entry.signal,
            status: entry.status,
            kind: entry.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: TradeState,
    pub entries: Vec<PendingEntry>,
}

impl TradeState {
    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Map one signal onto the entries it produces and the resulting state.
    pub fn transition(&self, signal: Signal) -> Transition {
        use PositionSide::{Long, Short};

        let n = self.order_number;
        let unchanged = |signal| Transition {
            next: *self,
            entries: vec![PendingEntry::mark(n, signal)],
        };
        let reverse = |signal, side| Transition {
            next: TradeState {
                order_number: n + 1,
                position: Some(side),
            },
            entries: vec![
                PendingEntry::close(n, signal),
                PendingEntry::open(n + 1, signal),
            ],
        };

        match (self.position, signal) {
            (None, Signal::Buy) => Transition {
                next: TradeState {
                    order_number: n + 1,
                    position: Some(Long),
                },
                entries: vec![PendingEntry::open(n + 1, Signal::Buy)],
            },
            (None, Signal::Sell) | (None, Signal::Hold) => unchanged(signal),

            (Some(Long), Signal::Sell) => reverse(Signal::Sell, Short),
            (Some(Long), Signal::Buy) | (Some(Long), Signal::Hold) => unchanged(signal),

            (Some(Short), Signal::Buy) => reverse(Signal::Buy, Long),
            (Some(Short), Signal::Sell) | (Some(Short), Signal::Hold) => unchanged(signal),
        }
    }

    /// Check one entry against this state and return the state after it.
    pub fn step(&self, symbol: &str, entry: &PendingEntry) -> Result<TradeState> {
        let reject = |reason: String| Error::Ledger {
            symbol: symbol.to_string(),
            reason,
        };
        let n = self.order_number;

        match entry.kind {
            EntryKind::Open => {
                if entry.status != PositionStatus::Open {
                    return Err(reject(format!("open entry #{} has status {}", entry.order_number, entry.status)));
                }
                if let Some(side) = self.position {
                    return Err(reject(format!(
                        "cannot open #{} while {side} #{n} is still open",
                        entry.order_number
                    )));
                }
                if entry.order_number != n + 1 {
                    return Err(reject(format!(
                        "open #{} does not follow #{n}",
                        entry.order_number
                    )));
                }
                let side = match entry.signal {
                    Signal::Buy => PositionSide::Long,
                    Signal::Sell => PositionSide::Short,
                    Signal::Hold => {
                        return Err(reject(format!("open #{} carries HOLD", entry.order_number)))
                    }
                };
                Ok(TradeState {
                    order_number: entry.order_number,
                    position: Some(side),
                })
            }
            EntryKind::Close => {
                if entry.status != PositionStatus::Closed {
                    return Err(reject(format!("close entry #{} has status {}", entry.order_number, entry.status)));
                }
                if self.position.is_none() || entry.order_number != n || n == 0 {
                    return Err(reject(format!(
                        "close #{} has no matching open order",
                        entry.order_number
                    )));
                }
                Ok(TradeState {
                    order_number: n,
                    position: None,
                })
            }
            EntryKind::Mark => {
                if entry.status != PositionStatus::Open || entry.order_number != n {
                    return Err(reject(format!(
                        "mark #{} ({}) does not match current order #{n}",
                        entry.order_number, entry.status
                    )));
                }
                Ok(*self)
            }
        }
    }

    /// Validate every entry of a transition and return the checked next state.
    pub fn validate(&self, symbol: &str, transition: &Transition) -> Result<TradeState> {
        let mut state = *self;
        for entry in &transition.entries {
            state = state.step(symbol, entry)?;
        }
        if state != transition.next {
            return Err(Error::Ledger {
                symbol: symbol.to_string(),
                reason: format!("entries lead to {state:?}, transition claims {:?}", transition.next),
            });
        }
        Ok(state)
    }

    /// Rebuild the state of `symbol` from its persisted entries, oldest first.
    pub fn replay<'a, I>(symbol: &str, entries: I) -> Result<TradeState>
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        entries
            .into_iter()
            .try_fold(TradeState::default(), |state, entry| {
                if entry.symbol != symbol {
                    return Err(Error::Ledger {
                        symbol: symbol.to_string(),
                        reason: format!("entry for {} in the log of {symbol}", entry.symbol),
                    });
                }
                state.step(symbol, &PendingEntry::from(entry))
            })
    }
}
