//! usm Core Library
//!
//! This crate is the engine of the usm userscript manager: it stores
//! user-authored scripts, decides which of them apply to a page URL and
//! injects them, behind a small compatibility API, into page context.
//!
//! # Architecture
//!
//! Browser facilities are reached only through collaborator traits, so
//! the same engine runs in an extension background (via `usm-wasm`), in
//! the CLI host, or in tests:
//!
//! - [`storage::KeyValueStorage`]: the extension's local storage area
//! - [`update::Fetcher`]: network access
//! - [`inject::PageExecutor`]: code execution in a page
//! - [`inject::Tabs`]: tab queries, navigation and notifications
//!
//! # Modules
//!
//! - `metadata`: `==UserScript==` header parsing
//! - `pattern`: `@match` / `@include` / `@exclude` glob matching
//! - `store`: durable script collection
//! - `resolver`: which scripts run on a URL
//! - `inject`: shim-first, per-script isolated injection
//! - `update`: version polling of update sources
//! - `values`: per-caller `GM_*Value` storage
//! - `messages`: the request/response protocol and its dispatcher
//! - `shim`: page-context payloads
//! - `url`: install-link detection
//! - `types`: shared type definitions

pub mod error;
pub mod inject;
pub mod messages;
pub mod metadata;
pub mod pattern;
pub mod resolver;
pub mod shim;
pub mod storage;
pub mod store;
pub mod types;
pub mod update;
pub mod url;
pub mod values;

// Re-export commonly used types
pub use error::{Error, FetchError, HostError, InjectionError, StorageError};
pub use inject::{ActivationReport, InjectionEngine, PageExecutor, Tabs};
pub use messages::{Background, Request, Response, Sender};
pub use metadata::{parse_metadata, ParsedMetadata};
pub use pattern::{matches_pattern, UrlPattern};
pub use resolver::resolve;
pub use storage::{KeyValueStorage, MemoryStorage, Preferences};
pub use store::ScriptStore;
pub use types::{EngineConfig, FrameTarget, InjectionMode, NavigationEvent, NewScript, ScriptPatch, ScriptRecord, TabInfo};
pub use update::{Fetcher, HttpRequest, HttpResponse, UpdateChecker};
