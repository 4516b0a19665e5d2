/// Algorithms
pub mod alg;
/// Partitions
pub mod part;
/// Strings
pub mod str;
/// Types
pub mod types;
