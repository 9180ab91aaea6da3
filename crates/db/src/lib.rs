pub mod connection;
pub mod data_store;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, ping, DbPool};
pub use data_store::{
    DataStore, DataStoreError, DataTransaction, Filter, Row, RowQuery, SqlDataStore,
};
