pub mod access;
pub mod attachment;
pub mod error;
pub mod history;
pub mod invoice;
pub mod notify;
pub mod service;
pub mod snapshot;
pub mod status;
pub mod taxpayer;
pub mod transition;
pub mod types;
pub mod utils;
