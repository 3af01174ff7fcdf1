//! HTTP handlers, one module per resource.

pub mod health_service;
pub mod pos_service;
pub mod sync_service;
pub mod table_service;
