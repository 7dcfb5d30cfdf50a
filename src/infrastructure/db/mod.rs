pub mod client;
pub mod row_mapper;
pub mod sql_utils;
