/// Filesystem discovery of producer batch files.
pub mod fs;
