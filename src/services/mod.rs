pub mod notifier;
pub mod signing;
pub mod storage;
pub mod template;
