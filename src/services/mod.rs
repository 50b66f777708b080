pub mod catalog;
pub mod clock;
pub mod identity;
pub mod jobs;
pub mod messaging;
pub mod reminders;
pub mod scheduling;
