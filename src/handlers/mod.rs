pub mod index;
pub mod servers;
