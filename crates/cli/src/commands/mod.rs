pub mod ask;
pub mod chat;
pub mod index;
pub mod probe;
pub mod replay;
pub mod setup;
