// Data models for pose landmark detection and inbound images

pub mod image;
pub mod pose;
