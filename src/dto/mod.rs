//! Objetos de transferencia de la API HTTP

pub mod api_response;
pub mod auth_dto;
pub mod invitation_dto;
pub mod password_dto;
pub mod registration_dto;

pub use api_response::ApiResponse;
