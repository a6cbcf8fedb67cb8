//! Built-in business modules. Only their genesis contracts live here.

pub mod auth;
pub mod chainmanager;
pub mod checkpoint;
pub mod staking;
