//! Media handling: classification, fetched assets, the image transform and the archive.

pub mod archive;
pub mod asset;
pub mod classifier;
pub mod transform;

pub use archive::{ArchiveKind, MediaArchive};
pub use asset::MediaAsset;
pub use classifier::{Classification, classify};
pub use transform::{
    ColorChannel, CropRect, CropSpec, ImageTransform, PhotometricSpec, ProcessedImage,
};
