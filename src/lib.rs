pub mod catalog;
pub mod channel;
pub mod config;
pub mod dialogue;
pub mod intent;
pub mod ledger;
pub mod pricing;
pub mod provider;
pub mod session;
pub mod shared;
