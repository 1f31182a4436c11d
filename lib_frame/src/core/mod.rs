pub mod inventory;
pub mod ota;
pub mod pairing;
pub mod registry;
pub mod sorting;
pub mod sync;
