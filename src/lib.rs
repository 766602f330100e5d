//! # Persona Context
//!
//! A local-first document context engine for character-driven chat.
//!
//! Documents are added to a SQLite-backed library, preprocessed and
//! chunked into immutable versions, and assigned to characters. At chat
//! time, a character's documents are ranked against the user's query and
//! packed into a fixed token budget, degrading from full text to truncated
//! text to a short summary as space runs out.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │   extract    │──▶│ preprocess + │──▶│  SQLite  │
//! │ txt/md/pdf/  │   │    chunk     │   │ versions │
//! │    docx      │   └──────────────┘   └────┬─────┘
//! └──────────────┘                           │
//!                       ┌────────────────────┤
//!                       ▼                    ▼
//!                 ┌──────────┐        ┌────────────┐
//!                 │  assign  │───────▶│ rank+budget│──▶ context text
//!                 └──────────┘        └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pctx init
//! pctx add ./lore --tag campaign
//! pctx assign mira <doc-id>
//! pctx context mira "who guards the northern pass?" --budget 4096
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction from uploaded files |
//! | [`preprocess`] | Preset and custom text transforms |
//! | [`chunk`] | Text chunking |
//! | [`store`] | Versioned document library |
//! | [`assign`] | Character assignments and version pins |
//! | [`rank`] | Relevance ranking with offload and fallback |
//! | [`budget`] | Token budget allocation |
//! | [`context`] | Context assembly |
//! | [`export`] | JSON snapshot export and import |
//! | [`scan`] | Directory walking for `pctx add` |
//! | [`stats`] | Library statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod assign;
pub mod assign_cmd;
pub mod budget;
pub mod chunk;
pub mod config;
pub mod context;
pub mod context_cmd;
pub mod db;
pub mod edit_cmd;
pub mod export;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod preprocess;
pub mod progress;
pub mod rank;
pub mod scan;
pub mod stats;
pub mod store;
pub mod version_cmd;
