pub mod analysis;
pub mod identity;
pub mod multipart;
pub mod queue;
pub mod response_parser;
pub mod storage;
pub mod upload;
pub mod vision;
