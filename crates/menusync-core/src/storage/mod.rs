//! Small persistent key-value blobs, and the favourites list kept in them.

pub mod blob;
pub mod favorites;

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use favorites::Favorites;
