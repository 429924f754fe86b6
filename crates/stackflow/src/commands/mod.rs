pub mod deploy;
pub mod remove;
