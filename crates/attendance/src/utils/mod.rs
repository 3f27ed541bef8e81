pub mod embedder;
pub mod gallery;
pub mod image_resize;
pub mod output;
pub mod sources;
pub mod template_tracker;
