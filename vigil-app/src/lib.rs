//! The Vigil sidechain application.
//!
//! [`VigilApp`] implements the engine-facing [`vigil_abci::Application`]
//! contract over a shared key-value store. Construction takes the pruning
//! strategy, halt height/time and minimum gas prices exactly as configured.
//! Genesis state is checked by the [`genesis::ModuleRegistry`] before the chain
//! is initialized.

pub mod app;
pub mod error;
pub mod genesis;
pub mod modules;
pub mod options;
pub mod pruning;

pub use app::VigilApp;
pub use error::AppError;
pub use genesis::{AppGenesisState, GenesisFailure, GenesisVerifier, ModuleError, ModuleRegistry};
pub use options::{halt_from_flag, AppOptions, MinGasPrices};
pub use pruning::PruningStrategy;
