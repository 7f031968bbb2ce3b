#![allow(dead_code)]

pub mod builders;
pub mod db;

pub use builders::{AuthCodeBuilder, ClientBuilder, TokenBuilder};
pub use db::TestDb;
