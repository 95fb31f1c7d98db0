use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Configuration for the durable storage of an origin.
pub enum StoreConfiguration {
    /// Keep durable data in memory. Data is shared by the contexts of the origin but is lost when
    /// the origin is dropped.
    InMemory,

    /// Keep durable data in a SQLite database.
    Sqlite {
        /// The file path to the SQLite database. Different origins should be stored in different
        /// files.
        file_path: PathBuf,
    },
}
