//! Domain models for archived mail entities

mod account;
mod attachment;
mod message;

pub use account::Account;
pub use attachment::{Attachment, AttachmentParent, NewAttachment};
pub use message::{Message, MessageId};
