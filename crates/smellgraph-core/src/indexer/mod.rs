pub mod filesystem;
pub mod imports;
pub mod java;
pub mod parser;
pub mod pipeline;
pub mod python;
