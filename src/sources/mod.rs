//! Concrete telemetry sources

pub mod shared_memory;

pub use shared_memory::{
    PLAYER_VEHICLE_ID, RawSample, RawVehicle, SharedMemoryReader, SharedMemorySource,
};
