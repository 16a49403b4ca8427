pub mod array;
pub mod hash;
