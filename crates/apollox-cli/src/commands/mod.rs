pub mod describe;
pub mod run;
pub mod seed;
