// src/lib.rs

//! span: bibliographic metadata conversion with ISIL tagging

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
