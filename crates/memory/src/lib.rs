pub mod kv;
pub mod ltm;
pub mod recall;

pub use kv::KvStore;
pub use ltm::{LtmEntry, LtmKind, LtmStore};
