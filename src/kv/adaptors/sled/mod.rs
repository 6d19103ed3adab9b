mod sled_kv;

pub use sled_kv::*;
