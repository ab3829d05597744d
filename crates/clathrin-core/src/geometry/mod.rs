pub mod kabsch;
pub mod rigid;
pub mod so3;
