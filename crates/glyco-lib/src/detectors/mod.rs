pub mod episodes;
pub mod patterns;
