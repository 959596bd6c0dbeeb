pub mod core;
pub mod reconcile;
pub mod update;
