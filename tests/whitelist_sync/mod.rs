mod memory_store_case;
mod sled_store_case;
