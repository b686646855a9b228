mod memory;

pub use memory::InMemoryRoamingNetwork;
