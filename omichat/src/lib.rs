//! OMI Chat: terminal client for a polled, spreadsheet-backed message store.

pub mod app;
pub mod chat;
pub mod config;
pub mod export;
pub mod net;
pub mod session;
pub mod storage;
pub mod store;
pub mod ui;
