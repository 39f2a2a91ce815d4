//! retail-service: cube rentals with rent accrual reminders, per-tenant
//! inventory and an idempotent point-of-sale checkout.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
