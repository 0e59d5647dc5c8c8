pub mod prelude;

pub mod dialog;
pub mod dialog_snapshot;
pub mod message;
pub mod role;

pub use role::Role;
