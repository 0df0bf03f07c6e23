//! Infrastructure concerns shared by every layer

pub mod log_messages;
