mod mem_kv;

pub use mem_kv::*;
