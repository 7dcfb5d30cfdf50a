pub mod changeset;
pub mod config;
pub mod db;
pub mod gpkg;
pub mod locator;
