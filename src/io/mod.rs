pub mod fasta;
pub mod blocks;
pub mod gfa;

pub use fasta::load_msa;
pub use blocks::{read_blocks, write_blocks, JsonBlockFile};
pub use gfa::write_gfa;
