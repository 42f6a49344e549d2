pub mod campaigns;
pub mod db;
pub mod graph;
pub mod models;
pub mod schema;
pub mod vectors;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
