pub mod advisor;
pub mod booking;
pub mod leave_period;
pub mod notification_queue;

pub use advisor::AdvisorRepository;
pub use booking::BookingRepository;
pub use leave_period::LeavePeriodRepository;
pub use notification_queue::NotificationQueueRepository;
