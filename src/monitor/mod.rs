// SPDX-License-Identifier: GPL-3.0-only
//! Device discovery and connection lifecycle

pub mod enumeration;
pub mod manager;
pub mod session;

pub use enumeration::find_device;
pub use manager::{lock, ConnectionManager, ConnectionState, SharedManager, Sleeper, ThreadSleeper};
pub use session::Session;
