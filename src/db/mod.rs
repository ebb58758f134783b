pub mod models;
pub mod repository;

pub use repository::{
    AdvisorRepository, BookingRepository, LeavePeriodRepository, NotificationQueueRepository,
};
