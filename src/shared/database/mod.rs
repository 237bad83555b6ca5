pub mod connection;
pub mod row;

pub use connection::{backup_database, create_in_memory_connection, create_tables, initialize_database};
