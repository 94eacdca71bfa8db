//! Blogicum - A small multi-author blog
//!
//! Authors publish posts (optionally scheduled, categorised and placed at a
//! location), readers comment on them, and administrators manage categories
//! and locations through a JSON API.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
