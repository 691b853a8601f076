pub mod checkout;
pub mod eligibility;
pub mod notifications;
pub mod scheduler;
pub mod settlement;
