pub mod dependencies;
pub mod guards;
