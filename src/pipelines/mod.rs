pub mod basic;
pub mod rgb_shift;
pub mod scene;
