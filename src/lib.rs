//! Coordination core of a research-assistant client, in a strictly linted crate.

// Interdiction stricte de pratiques dangereuses ou non idiomatiques
#![deny(unsafe_code)] // Le code unsafe est interdit
#![deny(missing_docs)] // Toute fonction, struct, enum ou module public doit être documenté
#![deny(non_camel_case_types)]
#![deny(unused_must_use)] // Oblige à gérer explicitement les Result et Option
#![deny(non_snake_case)] // Les noms de variables et fonctions doivent être en snake_case
#![deny(non_upper_case_globals)] // Les constantes et globals doivent être en MAJUSCULE
#![deny(nonstandard_style)] // Empêche tout style de code non standard
#![forbid(unsafe_op_in_unsafe_fn)]
// Clippy pour stricte discipline
#![warn(clippy::all)] // Active toutes les lints Clippy standard
#![warn(clippy::pedantic)] // Active les lints très strictes de Clippy
#![warn(clippy::unwrap_used)] // Décourage unwrap() hors des tests
#![warn(clippy::print_stdout)] // Décourage println!() en production

/// Coordinating service tying every subsystem together.
pub mod assistant;
/// Generative backend boundary and its HTTP implementation.
pub mod backend;
/// Server startup helpers.
pub mod bootstrap;
/// Inline citation micro-format parsing.
pub mod citation;
/// Service configuration.
pub mod config;
/// Strongly typed identifiers.
pub mod ids;
/// Document ingestion pipeline (files, dropped folders, links).
pub mod ingest;
/// Static knowledge-base catalog.
pub mod knowledge;
/// Project collection and conversation history.
pub mod project;
/// HTTP server and API routes.
pub mod server;
/// Per-project backend session lifecycle.
pub mod session;
/// Persisted application state.
pub mod storage;
