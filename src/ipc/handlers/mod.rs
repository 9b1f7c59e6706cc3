pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod curriculums;
pub mod roster;
pub mod sections;
pub mod setup;
pub mod subjects;
pub mod sync_admin;

mod helpers;
