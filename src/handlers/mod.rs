//! HTTP handlers for catalog resources.

pub mod resource;
