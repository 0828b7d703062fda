pub mod client;
pub mod multipart;
pub mod signer;
pub mod xml;

pub use client::{content_type_for, ListPage, ObjectSummary, OssClient, UploadedObject};
pub use signer::{region_from_endpoint, Credentials, V4Signer};
