//! # Idea Hunter
//!
//! Turns user complaints into scored product ideas.
//!
//! Sources (Reddit listings and comment threads, Play Store reviews) are
//! scraped through a polite retrying fetcher. Every collected item passes a
//! sentiment gate and a near-duplicate check before it is stored as a
//! complaint. Complaints without an idea are sent to a language model that
//! answers with a one-line idea and six 1–10 scores. A cost guard watches
//! the mean tokens spent per idea.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────┐
//! │   Sources   │──▶│    Filter    │──▶│ Generator  │──▶│  SQLite  │
//! │ Reddit/Play │   │ Sent.+Dedup  │   │ LLM+Guard  │   │  Store   │
//! └─────────────┘   └──────────────┘   └────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hunt init                     # create database
//! hunt sources                  # list configured sources
//! hunt run                      # collect, filter, generate
//! hunt stats                    # what is stored
//! hunt guard usage.json         # offline cost check
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fetch`] | Retrying HTTP fetcher |
//! | [`source`] | Source trait and registry |
//! | [`source_reddit`] | Reddit adapter |
//! | [`source_play_store`] | Play Store adapter |
//! | [`sentiment`] | Lexicon sentiment analysis |
//! | [`fingerprint`] | Near-duplicate fingerprints |
//! | [`filter`] | Complaint gate |
//! | [`llm`] | Language model clients |
//! | [`generator`] | Idea generation and reply parsing |
//! | [`cost_guard`] | Token cost ceiling |
//! | [`pipeline`] | Run orchestration |
//! | [`store`] | Storage trait and in-memory backend |
//! | [`sqlite_store`] | SQLite backend |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod cost_guard;
pub mod db;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod fingerprint;
pub mod generator;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod sentiment;
pub mod source;
pub mod source_play_store;
pub mod source_reddit;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
pub mod store;
