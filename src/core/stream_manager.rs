//! Stream hold manager
//!
//! Translates payment stream lifecycle events into balance engine calls.
//! Only `Started` names the paying account; every later event finds the
//! account through the stream's hold.

use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use super::engine::BalanceEngine;
use crate::store::LedgerStore;
use crate::types::{AccountId, LedgerEntry, LedgerError, StreamHold, StreamId};

/// Attempts made to complete a stream whose outstanding amount keeps moving
const MAX_RELEASE_ATTEMPTS: usize = 3;

/// Lifecycle event of one payment stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Started {
        account_id: AccountId,
        stream_id: StreamId,
        amount: Decimal,
        buffer: Decimal,
    },
    ToppedUp {
        stream_id: StreamId,
        amount: Decimal,
        buffer: Decimal,
    },
    Payout {
        stream_id: StreamId,
        amount: Decimal,
        reference_id: String,
    },
    Completed {
        stream_id: StreamId,
        streamed_amount: Decimal,
    },
    Cancelled {
        stream_id: StreamId,
    },
}

/// What handling an event changed
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// The hold after a start or top up
    Held(StreamHold),
    /// The payout entry
    PaidOut(LedgerEntry),
    /// The released hold and what went back to `available`
    Released { hold: StreamHold, returned: Decimal },
}

/// Drives stream holds through their lifecycle
#[derive(Debug)]
pub struct StreamHoldManager<S> {
    engine: BalanceEngine<S>,
}

impl<S> Clone for StreamHoldManager<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<S: LedgerStore> StreamHoldManager<S> {
    pub fn new(engine: BalanceEngine<S>) -> Self {
        StreamHoldManager { engine }
    }

    pub fn engine(&self) -> &BalanceEngine<S> {
        &self.engine
    }

    /// Apply one lifecycle event
    pub fn handle(&self, event: StreamEvent) -> Result<StreamOutcome, LedgerError> {
        match event {
            StreamEvent::Started {
                account_id,
                stream_id,
                amount,
                buffer,
            } => self
                .start(&account_id, &stream_id, amount, buffer)
                .map(StreamOutcome::Held),
            StreamEvent::ToppedUp {
                stream_id,
                amount,
                buffer,
            } => self
                .top_up(&stream_id, amount, buffer)
                .map(StreamOutcome::Held),
            StreamEvent::Payout {
                stream_id,
                amount,
                reference_id,
            } => self
                .payout(&stream_id, amount, &reference_id)
                .map(StreamOutcome::PaidOut),
            StreamEvent::Completed {
                stream_id,
                streamed_amount,
            } => self
                .complete(&stream_id, streamed_amount)
                .map(|(hold, returned)| StreamOutcome::Released { hold, returned }),
            StreamEvent::Cancelled { stream_id } => self
                .cancel(&stream_id)
                .map(|(hold, returned)| StreamOutcome::Released { hold, returned }),
        }
    }

    /// Reserve funds for a new stream
    ///
    /// # Errors
    ///
    /// * `InvalidBuffer` - `buffer` is larger than `amount`
    /// * `StreamAlreadyHeld` - the stream already has a hold
    #[instrument(skip(self), fields(%amount, %buffer))]
    pub fn start(
        &self,
        account_id: &str,
        stream_id: &str,
        amount: Decimal,
        buffer: Decimal,
    ) -> Result<StreamHold, LedgerError> {
        if buffer > amount {
            return Err(LedgerError::InvalidBuffer { amount, buffer });
        }
        match self.engine.find_hold(stream_id) {
            Ok(_) => return Err(LedgerError::stream_already_held(stream_id)),
            Err(LedgerError::HoldNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let hold = self
            .engine
            .hold_for_stream(account_id, stream_id, amount, buffer)?;
        info!("stream started");
        Ok(hold)
    }

    #[instrument(skip(self), fields(%amount, %buffer))]
    pub fn top_up(
        &self,
        stream_id: &str,
        amount: Decimal,
        buffer: Decimal,
    ) -> Result<StreamHold, LedgerError> {
        let hold = self.engine.find_hold(stream_id)?;
        self.engine
            .top_up_hold(&hold.account_id, stream_id, amount, buffer)
    }

    #[instrument(skip(self), fields(%amount))]
    pub fn payout(
        &self,
        stream_id: &str,
        amount: Decimal,
        reference_id: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let hold = self.engine.find_hold(stream_id)?;
        self.engine
            .record_stream_payout(&hold.account_id, stream_id, amount, reference_id)
    }

    /// Finish a stream that paid out `streamed_amount` at settlement
    ///
    /// Whatever the hold still reserves beyond that goes back to
    /// `available`. Returns the released hold and the returned amount.
    ///
    /// # Errors
    ///
    /// * `InsufficientHold` - `streamed_amount` exceeds the outstanding amount
    #[instrument(skip(self), fields(%streamed_amount))]
    pub fn complete(
        &self,
        stream_id: &str,
        streamed_amount: Decimal,
    ) -> Result<(StreamHold, Decimal), LedgerError> {
        self.settle(stream_id, streamed_amount)
    }

    /// Abort a stream, returning everything it still reserves
    #[instrument(skip(self))]
    pub fn cancel(&self, stream_id: &str) -> Result<(StreamHold, Decimal), LedgerError> {
        self.settle(stream_id, Decimal::ZERO)
    }

    /// Release a hold, re-reading it when a concurrent payout moved its
    /// outstanding amount between the read and the release
    fn settle(
        &self,
        stream_id: &str,
        streamed_amount: Decimal,
    ) -> Result<(StreamHold, Decimal), LedgerError> {
        let mut attempt = 1;
        loop {
            let hold = self.engine.find_hold(stream_id)?;
            if !hold.is_active() {
                return Err(LedgerError::invalid_state(stream_id, hold.status, "release"));
            }

            let outstanding = hold.outstanding();
            if streamed_amount > outstanding {
                return Err(LedgerError::insufficient_hold(
                    stream_id,
                    outstanding,
                    streamed_amount,
                ));
            }
            let returned = outstanding - streamed_amount;

            match self.engine.release_from_stream(
                &hold.account_id,
                stream_id,
                streamed_amount,
                returned,
            ) {
                Ok(released) => {
                    info!(%returned, "stream released");
                    return Ok((released, returned));
                }
                Err(LedgerError::ReleaseMismatch { .. }) if attempt < MAX_RELEASE_ATTEMPTS => {
                    debug!(attempt, "outstanding moved during release, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    warn!(error = %e, "stream release failed");
                    return Err(e);
                }
            }
        }
    }
}
