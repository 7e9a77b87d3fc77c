pub mod file;
pub mod normalizer;
pub mod parser;
pub mod poller;
pub mod raw;
