//! Index Halo Infinite captures and link them to match history.
//!
//! A pass scans capture directories into a SQLite inventory, joins each file
//! against every owner's match store by capture time, then derives previews.

pub mod cli;
pub mod config;
pub mod correlate;
pub mod db;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod thumbnails;
pub mod tools;
pub mod watch;
