/// Name of the file that stores catalog metadata of a single database.
pub const METADATA_FILE_NAME: &str = "metadata.nqldb";
