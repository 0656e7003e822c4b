pub mod admin;
pub mod api;
pub mod codes;
pub mod config;
pub mod grader;
pub mod humanize;
pub mod jobs;
pub mod ledger;
pub mod observability;
pub mod storage;
