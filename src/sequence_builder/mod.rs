//! Sequence generation for next-event prediction models.
//!
//! Turns cleaned, time-sorted records into fixed-length model inputs with
//! their five targets.
//!
//! # Architecture
//!
//! - **SequenceWindower**: stateless windowing of one record run
//! - **WindowedBatch**: output tensor `(n, L, 4)` plus target arrays
//! - **StreamingWindower**: carries the trailing `L + 1` records across
//!   contiguous batches so windows can span them
//!
//! # Example
//!
//! ```ignore
//! use seismic_dataset::sequence_builder::SequenceWindower;
//!
//! let windower = SequenceWindower::new(30)?;
//! let batch = windower.window(&records, &feature_scaler)?;
//! if batch.is_empty() {
//!     // fewer than 32 records, skip this unit
//! }
//! ```

mod streaming;
mod windower;

pub use streaming::StreamingWindower;
pub use windower::{SequenceWindower, WindowedBatch};
