pub mod admins;
pub mod assistant;
pub mod core;
pub mod fees;
pub mod payments;
pub mod reports;
pub mod students;
