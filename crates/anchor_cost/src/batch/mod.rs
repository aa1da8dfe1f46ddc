//! One-shot batch passes over anchor lists and fee ledgers.

mod dates;
mod fees;

pub use dates::{attach_dates, DateSummary};
pub use fees::{harvest_fees, HarvestSummary};
