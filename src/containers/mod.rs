//! Container formats of the Creatures Evolution Engine: PRAY tagged-block
//! archives, COB object bundles, and the compressed archive envelope used
//! inside life-history blocks.

pub mod archive;
pub mod cob;
pub mod pray;
