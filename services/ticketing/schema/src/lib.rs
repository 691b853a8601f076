//! sea-orm entities for the ticketing service.
//!
//! `users`, `group_memberships` and `events` are owned by other parts of the platform;
//! this service only reads them.

pub mod events;
pub mod group_memberships;
pub mod notification_jobs;
pub mod organiser_accounts;
pub mod payments;
pub mod registrations;
pub mod tickets;
pub mod users;
