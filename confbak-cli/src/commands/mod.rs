mod backup;
mod list;
mod prune;
mod restore;

// Backup commands
pub use backup::run_backup;

// List commands
pub use list::run_list;

// Restore commands
pub use restore::run_restore;

// Prune commands
pub use prune::run_prune;
