pub mod ledger;
pub mod pipeline;
pub mod remote_store;
pub mod staging;
