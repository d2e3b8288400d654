pub mod completion;
pub mod init;
pub mod replay;
pub mod validate;
