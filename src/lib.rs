// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;

// Domain layer
pub mod bridge;
pub mod chat;
pub mod event;
pub mod hub;
pub mod registry;

// Transport layer
pub mod tcp;
pub mod udp;
pub mod ws;

// Application layer
pub mod api;
pub mod server;
