//! Container registry integration for image promotion

mod operations;
mod quay_adapter;

pub use operations::{
    ManifestLabel, ManifestLabelReader, RegistryTag, TagStore, find_label, find_tag,
};
pub use quay_adapter::{QUAY_API_URL, QuayRegistry};
