pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod profile;
pub mod reply;
pub mod startup;
pub mod state;
pub mod topic;
