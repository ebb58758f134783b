//! Database models split into separate files.

pub mod advisor;
pub mod booking;
pub mod notification_queue;

pub use self::advisor::*;
pub use self::booking::*;
pub use self::notification_queue::*;
