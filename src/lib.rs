//! # sqlgate
//!
//! Declarative SQL-over-HTTP gateway: a YAML config binds HTTP endpoints
//! and cron schedules to workflows — pipelines of templated Query,
//! HTTPCall, Block, Response, and Set steps run against SQL Server or
//! SQLite databases.
//!
//! ## Overview
//!
//! sqlgate lets you:
//! - **Bind** HTTP routes and cron schedules to declarative workflows
//! - **Query** SQL Server/SQLite with `minijinja`-templated, parameterized SQL
//! - **Compose** pipelines of query, outbound HTTP, conditional blocks, and
//!   response-shaping steps
//! - **Cache** workflow and per-step responses, and rate-limit by pool
//!
//! ## Quick Start
//!
//! ```no_run
//! use sqlgate::cli::Cli;
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> sqlgate::errors::Result<()> {
//!     let cli = Cli::parse();
//!     let config = sqlgate::config::load(&cli.config)?;
//!     let (log_handle, _guard) = sqlgate::log::init_from_config(&config.logging);
//!     sqlgate::server::run(&cli.config, config, log_handle).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! HTTP / cron trigger → Workflow Executor → Query/HTTPCall/Block/Set steps → Response
//! ```
//!
//! - **Template Engine**: `minijinja` function library plus a SQL
//!   `@name`-placeholder scanner
//! - **DB Manager**: pooled SQL Server (tiberius/bb8) and SQLite (sqlx) drivers
//! - **Response Cache**: in-memory, size-budgeted, workflow- and step-scoped
//! - **Rate Limiter**: named token-bucket pools with composite AND admission
//! - **Workflow Compiler/Executor**: validate-eagerly-then-run pipeline engine
//! - **HTTP/Cron Triggers**: inbound dispatch plus scheduled firing

pub use errors::Result;

pub mod cache;
pub mod cli;
pub mod config;
pub mod cron;
pub mod db;
pub mod errors;
pub mod http;
pub mod log;
pub mod ratelimit;
pub mod server;
pub mod template;
pub mod value;
pub mod workflow;
