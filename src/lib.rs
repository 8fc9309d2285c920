//! Types Installer LSP - flags package.json dependencies without type declarations
//!
//! For each runtime dependency of an open `package.json`, the server checks
//! whether TypeScript declarations are available (a `@types/*` dev
//! dependency, a `types` field in the installed package, or an
//! `index.d.ts` next to it). Dependencies without any get an information
//! diagnostic and a quick fix that installs the companion `@types/*`
//! package with npm or yarn.

pub mod analysis;
pub mod backend;
pub mod config;
pub mod document;
pub mod install;
pub mod parsers;
pub mod providers;
pub mod resolver;
pub mod utils;
pub mod workspace;
