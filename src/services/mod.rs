pub mod health_service;
pub mod items_service;

pub use health_service::HealthServiceImpl;
pub use items_service::ItemsServiceImpl;
