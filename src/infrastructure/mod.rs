pub mod ledger;
pub mod storage;
