pub mod assignments;
pub mod attendance;
pub mod core;
pub mod grades;
pub mod session;
