pub use super::dialog::Entity as Dialog;
pub use super::dialog_snapshot::Entity as DialogSnapshot;
pub use super::message::Entity as Message;
pub use super::role::Role;
