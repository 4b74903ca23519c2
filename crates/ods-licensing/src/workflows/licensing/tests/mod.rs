mod common;
mod counters;
mod ledger;
