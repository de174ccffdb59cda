pub mod batch;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod ledger;
pub mod mirror;
pub mod mosaic;
pub mod output;
pub mod reconcile;
pub mod remote;
pub mod runlog;
pub mod select;
pub mod tui;
pub mod vcs;
