pub mod booking;
pub mod service;
pub mod user;

pub use booking::{Booking, BookingStatus, NewBooking};
pub use service::Service;
pub use user::{ListScope, Requester, Role, User};
