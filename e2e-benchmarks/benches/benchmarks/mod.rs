pub mod cascadebench;
pub mod compilebench;
