pub mod extraction;
pub mod mapper;
pub mod materializer;
pub mod monitoring;
