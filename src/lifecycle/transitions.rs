use crate::domain::JobStatus;
use crate::error::{BookingError, BookingResult};

use JobStatus::*;

/// What is asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Accept,
    RequesterCancel,
    TranslatorCancel,
    EndSession,
    CustomerNoShow,
    Reopen,
    Expire,
    Admin,
}

/// The complete table of permitted status edges.
pub fn is_allowed(from: JobStatus, to: JobStatus, trigger: Trigger) -> bool {
    match trigger {
        Trigger::Accept => matches!((from, to), (Pending | Timedout, Assigned)),
        Trigger::RequesterCancel => matches!(
            (from, to),
            (Pending | Assigned, WithdrawBefore24 | WithdrawAfter24)
        ),
        Trigger::TranslatorCancel => matches!((from, to), (Assigned, Pending)),
        Trigger::EndSession => matches!((from, to), (Started, Completed)),
        Trigger::CustomerNoShow => matches!((from, to), (Started, NotCarriedOutCustomer)),
        Trigger::Reopen => from != Pending && to == Pending,
        Trigger::Expire => matches!((from, to), (Pending, Timedout)),
        Trigger::Admin => matches!(
            (from, to),
            (
                Pending,
                Assigned | WithdrawBefore24 | WithdrawAfter24 | Timedout
            ) | (
                Assigned,
                Started | WithdrawBefore24 | WithdrawAfter24 | Timedout
            ) | (Started, Completed | NotCarriedOutCustomer)
                | (Timedout, Pending | Assigned)
                | (Completed, Timedout)
                | (WithdrawAfter24, Timedout)
        ),
    }
}

pub fn ensure(from: JobStatus, to: JobStatus, trigger: Trigger) -> BookingResult<()> {
    if is_allowed(from, to, trigger) {
        Ok(())
    } else {
        Err(BookingError::InvalidTransition { from, to })
    }
}
