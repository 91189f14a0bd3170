pub mod http_tool;
pub mod preset;
pub mod profile;
