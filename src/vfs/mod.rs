mod dir_fs;
mod entry;
mod map_fs;

pub use dir_fs::DirFS;
pub use entry::{DocumentEntry, DocumentStat, EntryType, FoundEntry};
pub use map_fs::MapFS;
