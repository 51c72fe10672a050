pub mod bins;
pub mod cis;
pub mod filter;
pub mod genome;
pub mod glm;
pub mod normalize;
pub mod pipeline;
pub mod significance;
pub mod super_fire;
pub mod utils;

pub use bins::{Bin, BinTable};
pub use cis::ContactMatrices;
pub use genome::{parse_flag, GenomeBuild};
pub use pipeline::{fire_caller, FireOptions, FireResult};
pub use significance::FireTable;
pub use super_fire::SuperFire;
