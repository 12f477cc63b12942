//! Parsers and writers for the file formats of the Creatures Evolution
//! Engine: PRAY tagged-block archives, legacy and tagged COB object
//! bundles, and the S16/C16/SPR sprite family.

pub mod binary_utils;
pub mod containers;
pub mod error;
pub mod formats;

pub use error::{C2eError, C2eResult};
