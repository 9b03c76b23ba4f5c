pub mod errors;
pub mod msa;
pub mod blocks;
pub mod cover;
pub mod solver;
pub mod graph;
pub mod io;
pub mod pipeline;
