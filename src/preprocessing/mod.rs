//! Feature and target preprocessing.
//!
//! - **Normalization**: fitted, persisted scalers
//!   - Min-max for the four input features
//!   - Single-feature min-max for each regression target
//!   - Fit-or-load `ensure_feature_scaler` step, run once per pipeline
//!
//! - **Balancing**: minority upsampling of the occurrence label
//!   - Runs once on an in-memory dataset, never per epoch
//!   - No-op when a class is absent
//!
//! # Example
//!
//! ```ignore
//! use seismic_dataset::preprocessing::{ensure_feature_scaler, ScalerOrigin};
//!
//! let (scaler, origin) = ensure_feature_scaler(&path, &mut cursor, 10_000, true)?;
//! if origin == ScalerOrigin::Fitted {
//!     log::info!("fitted a new feature scaler");
//! }
//! ```

pub mod balancing;
pub mod normalization;

pub use balancing::{BalancedIndices, ClassBalancer};
pub use normalization::{
    ensure_feature_scaler, MinMaxFit, MinMaxScaler, Scaler, ScalerOrigin, TargetScalers,
    TargetScalersFit,
};
