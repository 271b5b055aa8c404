pub mod refocus;
pub mod logger;
