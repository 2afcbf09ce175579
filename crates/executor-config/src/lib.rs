//! Configuration for the off-chain smart-contract execution coordinator
//! (spec §9 "Global configuration by height").

mod config;
pub mod height_indexed;

pub use config::ContractConfig;
pub use height_indexed::{HeightActivation, HeightIndexedConfig, HeightIndexedConfigError};
