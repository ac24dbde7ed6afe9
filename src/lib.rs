pub mod audit;
pub mod cache;
pub mod config;
pub mod db;
pub mod dto;
pub mod entity;
pub mod error;
pub mod geocode;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod scheduling;
pub mod services;
pub mod state;
