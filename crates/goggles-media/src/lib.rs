//! goggles-media: the I/O edge of the filters.
//!
//! Decodes and encodes photos with the `image` crate, loads the overlay
//! asset and writes processed images into a gallery directory.

pub mod codec;
pub mod gallery;

pub use codec::{decode, encode, load_asset, open, save, MediaError};
pub use gallery::Gallery;
